//! Mapping dynamic-test failures back to positions in learner code.

use std::sync::OnceLock;

use dojo_core::domain::{Diagnostic, FailureRecord, TestError};
use regex::Regex;

/// Marker of the frame that evaluated learner code.
pub const EVAL_FRAME_MARKER: &str = "eval";

/// Trailing `line:column)` of a stack frame.
const FRAME_POSITION_PATTERN: &str = r"(\d+):(\d+)\)$";

fn frame_position() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(FRAME_POSITION_PATTERN).ok())
        .as_ref()
}

/// Position of the learner-code frame that raised `error`, if the error was
/// raised from inside evaluated learner code.
///
/// Only the second stack line is inspected: the first is the error summary,
/// the second the innermost frame.
pub fn eval_position(error: &TestError) -> Option<(u32, u32)> {
    let frame = error.stack_line(1)?.trim_end();
    if !frame.contains(EVAL_FRAME_MARKER) {
        return None;
    }
    let captures = frame_position()?.captures(frame)?;
    let line = captures.get(1)?.as_str().parse().ok()?;
    let column = captures.get(2)?.as_str().parse().ok()?;
    Some((line, column))
}

/// `Failure` diagnostic named after the failing spec, optionally with the
/// underlying message appended as `"<name> : <message>"`.
pub fn failure_diagnostic(record: &FailureRecord, detailed: bool) -> Diagnostic {
    let message = if detailed && record.name != record.error.message {
        format!("{} : {}", record.name, record.error.message)
    } else {
        record.name.clone()
    };
    Diagnostic::failure(message)
}

/// Script classification: a crash inside learner code is an `Error` at the
/// crashing position, anything else an assertion-style `Failure`.
pub fn resolve_script_failure(record: &FailureRecord, detailed: bool) -> Diagnostic {
    match eval_position(&record.error) {
        Some((line, column)) => {
            Diagnostic::error(record.error.message.clone()).with_location(line, column)
        }
        None => failure_diagnostic(record, detailed),
    }
}
