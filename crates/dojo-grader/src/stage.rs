//! Grading stages and the driver every content pipeline shares.

use std::panic::AssertUnwindSafe;

use dojo_core::domain::{
    panic_message, ContentType, Diagnostic, ErrorOrigin, FailureRecord, ParseError, Response,
    ResponseKind, RunFailure,
};
use dojo_core::{obs, AnalyzerSettings, GradingOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::{AnalyzerError, Finding};
use crate::position::failure_diagnostic;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Lint or structural validation of the raw source.
    StaticAnalysis,

    /// Style rules (script only).
    StyleAnalysis,

    /// Build the structure handed to the dynamic test.
    Parse,

    /// Run the question's test against the submission.
    DynamicTest,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::StaticAnalysis => "static_analysis",
            Stage::StyleAnalysis => "style_analysis",
            Stage::Parse => "parse",
            Stage::DynamicTest => "dynamic_test",
        }
    }

    /// Kind a response gets when this stage rejects the submission.
    pub fn rejection_kind(&self) -> ResponseKind {
        match self {
            Stage::StaticAnalysis => ResponseKind::Lint,
            Stage::StyleAnalysis => ResponseKind::Style,
            Stage::Parse => ResponseKind::Error,
            Stage::DynamicTest => ResponseKind::Failure,
        }
    }
}

/// Per-content-type stage implementations.
pub trait ContentPipeline: Send + Sync {
    fn content_type(&self) -> ContentType;

    /// Stages this content type runs, in order.
    fn stages(&self) -> &'static [Stage];

    /// Run an analysis stage (`StaticAnalysis` or `StyleAnalysis`).
    /// Findings must be one-based.
    fn analyze(
        &self,
        stage: Stage,
        source: &str,
        settings: &AnalyzerSettings,
    ) -> Result<Vec<Finding>, AnalyzerError>;

    fn parse(&self, source: &str) -> Result<Value, ParseError>;

    /// Diagnostic for one dynamic-test failure record.
    fn resolve_failure(&self, record: &FailureRecord, detailed: bool) -> Diagnostic {
        failure_diagnostic(record, detailed)
    }
}

/// Run a synchronous stage, turning a collaborator panic into an `Error`
/// response.
fn guarded<T>(stage: Stage, f: impl FnOnce() -> T) -> Result<T, Response> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(stage = stage.name(), message = %message, "stage panicked");
        Response::error(message)
    })
}

fn short_circuit(stage: Stage, response: Response) -> Response {
    obs::emit_stage_short_circuited(
        stage.name(),
        response.kind().name(),
        response.diagnostics().len(),
    );
    response
}

/// Run every stage before `DynamicTest`.
///
/// Returns the parsed structure, or the response of the first stage that
/// rejected the submission. Findings are never truncated.
pub fn run_static_stages(
    pipeline: &dyn ContentPipeline,
    source: &str,
    options: &GradingOptions,
) -> Result<Value, Response> {
    let mut parsed = Value::Null;

    for &stage in pipeline.stages() {
        match stage {
            Stage::StaticAnalysis | Stage::StyleAnalysis => {
                let findings = guarded(stage, || pipeline.analyze(stage, source, &options.analyzers))
                    .map_err(|response| short_circuit(stage, response))?
                    .map_err(|e| short_circuit(stage, Response::error(e.to_string())))?;
                if !findings.is_empty() {
                    let kind = stage.rejection_kind();
                    let diagnostics = findings.into_iter().map(|f| f.into_diagnostic(kind)).collect();
                    return Err(short_circuit(stage, Response::classified(kind, diagnostics)));
                }
            }
            Stage::Parse => {
                parsed = guarded(stage, || pipeline.parse(source))
                    .map_err(|response| short_circuit(stage, response))?
                    .map_err(|e| {
                        let diagnostic = Diagnostic::error(e.message).with_position(e.line, e.column);
                        short_circuit(stage, Response::classified(ResponseKind::Error, vec![diagnostic]))
                    })?;
            }
            Stage::DynamicTest => {}
        }
    }

    Ok(parsed)
}

/// Classify a failed dynamic test.
///
/// Only the first failure record is reported unless `return_all_diagnostics`
/// is set. The response is `Error` when any reported record resolved to an
/// error, `Failure` otherwise.
pub fn classify_failure(
    pipeline: &dyn ContentPipeline,
    failure: RunFailure,
    options: &GradingOptions,
) -> Response {
    let records = failure.into_records();
    let limit = if options.return_all_diagnostics {
        records.len()
    } else {
        1
    };

    let diagnostics: Vec<Diagnostic> = records
        .iter()
        .take(limit)
        .map(|record| {
            if record.error.origin == ErrorOrigin::Setup {
                Diagnostic::error(record.error.message.clone())
            } else {
                pipeline.resolve_failure(record, options.return_detailed_messages)
            }
        })
        .collect();

    let kind = if diagnostics.iter().any(|d| d.kind == ResponseKind::Error) {
        ResponseKind::Error
    } else {
        ResponseKind::Failure
    };
    Response::classified(kind, diagnostics)
}
