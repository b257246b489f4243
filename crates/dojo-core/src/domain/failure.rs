//! Values carried by a failed dynamic test.

use std::any::Any;

use serde::{Deserialize, Serialize};

/// Where a test error came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// The test reported a failed expectation.
    Assertion,

    /// The test action returned an error synchronously.
    Thrown,

    /// Raised outside the test's own control flow and caught by the interceptor.
    Uncaught,

    /// Test code panicked.
    Panicked,

    /// The run's deadline elapsed first.
    TimedOut,

    /// The completion handle was dropped without settling.
    Abandoned,

    /// The harness could not prepare the test (environment, fixture).
    Setup,
}

/// An error surfaced by dynamic test code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TestError {
    pub message: String,

    /// Call-stack text, first line being the error summary.
    pub stack: Option<String>,

    pub origin: ErrorOrigin,
}

pub const TIMEOUT_MESSAGE: &str = "Test timed out.";
pub const ABANDONED_MESSAGE: &str = "Test finished without signalling completion.";

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            origin: ErrorOrigin::Assertion,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_origin(mut self, origin: ErrorOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn timed_out() -> Self {
        Self::new(TIMEOUT_MESSAGE).with_origin(ErrorOrigin::TimedOut)
    }

    pub fn abandoned() -> Self {
        Self::new(ABANDONED_MESSAGE).with_origin(ErrorOrigin::Abandoned)
    }

    /// Convert a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(panic_message(payload.as_ref())).with_origin(ErrorOrigin::Panicked)
    }

    /// The `index`-th line of the stack text, if any.
    pub fn stack_line(&self, index: usize) -> Option<&str> {
        self.stack.as_deref().and_then(|s| s.lines().nth(index))
    }

    pub fn is_timeout(&self) -> bool {
        self.origin == ErrorOrigin::TimedOut
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test code panicked".to_string()
    }
}

/// One assertion failure accumulated from a dynamic test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    /// Descriptive name, usually the failing spec's full name.
    pub name: String,
    pub error: TestError,
}

impl FailureRecord {
    pub fn new(name: impl Into<String>, error: TestError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    /// A record for a test that has no spec name of its own.
    pub fn from_error(error: TestError) -> Self {
        Self {
            name: error.message.clone(),
            error,
        }
    }
}

/// How a run settled when it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// A single error: thrown, uncaught, timed out, or reported through `Done`.
    Error(TestError),

    /// Every failed expectation of a suite-style test, in report order.
    Suite(Vec<FailureRecord>),
}

impl RunFailure {
    pub fn into_records(self) -> Vec<FailureRecord> {
        match self {
            RunFailure::Error(error) => vec![FailureRecord::from_error(error)],
            RunFailure::Suite(records) => records,
        }
    }

    pub fn first_error(&self) -> Option<&TestError> {
        match self {
            RunFailure::Error(error) => Some(error),
            RunFailure::Suite(records) => records.first().map(|r| &r.error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.first_error().is_some_and(TestError::is_timeout)
    }
}

impl From<TestError> for RunFailure {
    fn from(error: TestError) -> Self {
        RunFailure::Error(error)
    }
}

/// Settlement of one run.
pub type RunOutcome = std::result::Result<(), RunFailure>;
