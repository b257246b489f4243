//! Error taxonomy for Dojo.
//!
//! Only configuration problems escape to callers as `Err`. Everything that goes
//! wrong while grading a submission is classified into a [`Response`] instead.
//!
//! [`Response`]: super::response::Response

/// Misconfiguration detected while building a registry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("question type is either unsupported or undefined: {0}")]
    UnknownContentType(String),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(String),

    #[error("no {collaborator} configured for {content_type} questions")]
    MissingCollaborator {
        content_type: String,
        collaborator: &'static str,
    },

    #[error("invalid option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("options are not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure to produce or manage an execution environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("failed to load fixture {url}: {reason}")]
    FixtureLoad { url: String, reason: String },

    #[error("environment scope is closed; the run has already settled")]
    ScopeClosed,

    #[error("host error: {0}")]
    Host(String),
}

/// A structural parser rejected the source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Attach the position the parser reported, when it has one.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
