//! Classified diagnostics attached to a grading response.

use serde::{Deserialize, Serialize};

/// Classification shared by diagnostics and responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Static rule violation found before any execution.
    Lint,

    /// Style rule violation (script content only).
    Style,

    /// Parse failure, setup fault, or a runtime crash with a resolved position.
    Error,

    /// Assertion-style failure from the dynamic test.
    Failure,

    /// Every applicable stage passed.
    Success,
}

impl ResponseKind {
    /// Get the kind name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseKind::Lint => "lint",
            ResponseKind::Style => "style",
            ResponseKind::Error => "error",
            ResponseKind::Failure => "failure",
            ResponseKind::Success => "success",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseKind::Success)
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single structured finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    /// Classification.
    pub kind: ResponseKind,

    /// Human-readable message.
    pub message: String,

    /// Line number (1-indexed).
    pub line: Option<u32>,

    /// Column number (1-indexed).
    pub column: Option<u32>,
}

impl Diagnostic {
    /// Create a new diagnostic without a source position.
    pub fn new(kind: ResponseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Set both line and column.
    pub fn with_location(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Set whichever parts of the position are known.
    pub fn with_position(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn lint(message: impl Into<String>) -> Self {
        Self::new(ResponseKind::Lint, message)
    }

    pub fn style(message: impl Into<String>) -> Self {
        Self::new(ResponseKind::Style, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResponseKind::Error, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(ResponseKind::Failure, message)
    }

    /// Whether a source position is attached.
    pub fn has_position(&self) -> bool {
        self.line.is_some()
    }
}
