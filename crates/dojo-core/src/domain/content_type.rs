//! Content types a question can grade.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// The closed set of gradable content types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// HTML fragments.
    Markup,

    /// JavaScript sources.
    Script,

    /// CSS stylesheets.
    Stylesheet,
}

impl ContentType {
    pub fn name(&self) -> &'static str {
        match self {
            ContentType::Markup => "markup",
            ContentType::Script => "script",
            ContentType::Stylesheet => "stylesheet",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentType {
    type Err = ConfigError;

    /// Accepts the canonical names plus the language names declarations
    /// commonly use (`html`, `javascript`, `css`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markup" | "html" => Ok(ContentType::Markup),
            "script" | "javascript" | "js" => Ok(ContentType::Script),
            "stylesheet" | "css" => Ok(ContentType::Stylesheet),
            _ => Err(ConfigError::UnknownContentType(s.to_string())),
        }
    }
}
