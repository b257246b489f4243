//! Structured observability hooks for the grading lifecycle.
//!
//! This module provides:
//! - Answer-scoped tracing spans via the `AnswerSpan` RAII guard
//! - Emission functions for key lifecycle events: answer start and
//!   classification, stage short-circuits, run start/settle/timeout,
//!   uncaught errors, environment acquire/release
//!
//! Learner source is never logged; spans carry a short digest of it instead.

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Short, stable digest of a submission used to correlate log lines.
pub fn submission_digest(source: &str) -> String {
    let digest = hex::encode(Sha256::digest(source.as_bytes()));
    digest[..12].to_string()
}

/// RAII guard that enters an answer-scoped span for the duration of grading.
///
/// # Example
///
/// ```ignore
/// let _span = AnswerSpan::enter("q-hello-world", "<p>hi</p>");
/// // tracing calls are now associated with question_id and submission digest
/// ```
pub struct AnswerSpan {
    _span: tracing::span::EnteredSpan,
}

impl AnswerSpan {
    pub fn enter(question_id: &str, source: &str) -> Self {
        let span = answer_span(question_id, source);
        Self {
            _span: span.entered(),
        }
    }
}

/// The span `AnswerSpan` enters, for use with `Instrument` across awaits.
pub fn answer_span(question_id: &str, source: &str) -> tracing::Span {
    tracing::info_span!(
        "dojo.answer",
        question_id = %question_id,
        submission = %submission_digest(source),
    )
}

pub fn emit_answer_started(question_id: &str, content_type: &str) {
    info!(event = "answer.started", question_id = %question_id, content_type = %content_type);
}

pub fn emit_answer_classified(question_id: &str, kind: &str, diagnostics: usize, duration_ms: u64) {
    info!(
        event = "answer.classified",
        question_id = %question_id,
        kind = %kind,
        diagnostics = diagnostics,
        duration_ms = duration_ms,
    );
}

pub fn emit_stage_short_circuited(stage: &str, kind: &str, diagnostics: usize) {
    info!(
        event = "stage.short_circuited",
        stage = %stage,
        kind = %kind,
        diagnostics = diagnostics,
    );
}

pub fn emit_run_started(run_id: &str, label: &str, queued_behind: usize) {
    info!(event = "run.started", run_id = %run_id, label = %label, queued_behind = queued_behind);
}

pub fn emit_run_settled(run_id: &str, label: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.settled",
        run_id = %run_id,
        label = %label,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_run_timed_out(run_id: &str, label: &str, limit_ms: u64) {
    warn!(event = "run.timed_out", run_id = %run_id, label = %label, limit_ms = limit_ms);
}

pub fn emit_uncaught_consumed(message: &str) {
    info!(event = "uncaught.consumed", message = %message);
}

/// An uncaught error arrived while no run was in flight.
pub fn emit_uncaught_unhandled(message: &str) {
    warn!(event = "uncaught.unhandled", message = %message);
}

pub fn emit_environment_acquired(context_id: &str, fixture_url: Option<&str>) {
    debug!(
        event = "environment.acquired",
        context_id = %context_id,
        fixture_url = fixture_url.unwrap_or("-"),
    );
}

pub fn emit_environment_released(context_id: &str) {
    debug!(event = "environment.released", context_id = %context_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_digest_is_stable_and_short() {
        let a = submission_digest("var x = 1;");
        let b = submission_digest("var x = 1;");
        let c = submission_digest("var x = 2;");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_answer_span_create() {
        let _span = AnswerSpan::enter("q1", "<p>hello</p>");
    }
}
