//! Tracing setup for programs embedding Dojo.
//!
//! The filter comes from `DOJO_LOG`, then `RUST_LOG`, then a default that
//! enables the grading crates at the requested level and everything else at
//! `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG: &str = "DOJO_LOG";

/// Crates whose events the default filter lets through at the chosen level.
const GRADING_TARGETS: &[&str] = &["dojo_core", "dojo_grader"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,

    /// Newline-delimited JSON, one object per event.
    Json,
}

/// Default directive string: grading crates at `level`, the rest at `warn`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(GRADING_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Later calls are no-ops and return `false`.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(true).json())
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    installed.is_ok()
}
