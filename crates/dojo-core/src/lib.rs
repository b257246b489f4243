//! Dojo Core Library
//!
//! Machinery shared by every grading pipeline:
//! - the classified `Response` / `Diagnostic` model
//! - disposable execution environments and the host substrate they live on
//! - the serialized `Runner` with deadlines and uncaught-error interception
//! - a suite-style assertion framework and the `Reporter` that reduces its
//!   event stream to a single failure list

pub mod config;
pub mod domain;
pub mod environment;
pub mod metrics;
pub mod obs;
pub mod reporter;
pub mod runner;
pub mod suite;
pub mod telemetry;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::{AnalyzerSettings, GradingOptions, OptionOverrides, DEFAULT_TIMEOUT_MS};
pub use domain::{
    ConfigError, ContentType, Diagnostic, EnvironmentError, ErrorOrigin, FailureRecord,
    ParseError, Response, ResponseKind, RunFailure, RunOutcome, TestError,
};
pub use environment::{
    ContextId, DefaultFixtureLoader, EnvironmentFactory, EnvironmentHandle, ExecutionHost,
    FixtureLoader, HostStats, LocalHost, StaticFixtures,
};
pub use metrics::METRICS;
pub use obs::{submission_digest, AnswerSpan};
pub use reporter::{CompleteListener, FrameworkReporter, Reporter, SpecReport, SuiteReport};
pub use runner::{Done, Run, RunContext, Runner, SettleCallback};
pub use suite::{Expect, SpecStatus, SuiteEnv, SuiteSummary};
pub use telemetry::{init_tracing, LogFormat};

/// Dojo version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lock a mutex, recovering the data if a panicking test poisoned it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
