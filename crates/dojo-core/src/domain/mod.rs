//! Domain models for Dojo.
//!
//! Canonical definitions for the value types that cross module boundaries:
//! - `Diagnostic` / `Response`: the classified grading outcome
//! - `ContentType`: markup, script or stylesheet
//! - `TestError` / `FailureRecord` / `RunFailure`: what a failed dynamic test carries

pub mod content_type;
pub mod diagnostic;
pub mod error;
pub mod failure;
pub mod response;

pub use content_type::ContentType;
pub use diagnostic::{Diagnostic, ResponseKind};
pub use error::{ConfigError, EnvironmentError, ParseError, Result};
pub use failure::{
    panic_message, ErrorOrigin, FailureRecord, RunFailure, RunOutcome, TestError,
    ABANDONED_MESSAGE, TIMEOUT_MESSAGE,
};
pub use response::Response;
