//! The single classified outcome of grading one submission.

use serde::{Deserialize, Serialize};

use super::diagnostic::{Diagnostic, ResponseKind};

/// Outcome of one `answer` call.
///
/// A `Success` response never carries diagnostics; every other kind carries at
/// least one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "ResponseRepr")]
pub struct Response {
    kind: ResponseKind,
    diagnostics: Vec<Diagnostic>,
}

/// Wire shape of a `Response`, validated before it becomes one.
#[derive(Deserialize)]
struct ResponseRepr {
    kind: ResponseKind,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
}

impl TryFrom<ResponseRepr> for Response {
    type Error = String;

    fn try_from(repr: ResponseRepr) -> Result<Self, Self::Error> {
        match (repr.kind.is_success(), repr.diagnostics.is_empty()) {
            (true, false) => Err("a success response cannot carry diagnostics".to_string()),
            (false, true) => Err(format!("a {} response needs at least one diagnostic", repr.kind)),
            _ => Ok(Self {
                kind: repr.kind,
                diagnostics: repr.diagnostics,
            }),
        }
    }
}

impl Response {
    /// A passing response.
    pub fn success() -> Self {
        Self {
            kind: ResponseKind::Success,
            diagnostics: Vec::new(),
        }
    }

    /// A non-success response.
    ///
    /// An empty diagnostic list means an upstream collaborator reported a
    /// failure without saying why; that defect is surfaced as a diagnostic of
    /// its own instead of producing an empty failure.
    pub fn classified(kind: ResponseKind, mut diagnostics: Vec<Diagnostic>) -> Self {
        if kind.is_success() {
            if !diagnostics.is_empty() {
                tracing::warn!(
                    dropped = diagnostics.len(),
                    "success response built with diagnostics; dropping them"
                );
            }
            return Self::success();
        }

        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::new(
                kind,
                format!("{} reported without any diagnostics", kind),
            ));
        }

        Self { kind, diagnostics }
    }

    /// A single position-less `Error` diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::classified(ResponseKind::Error, vec![Diagnostic::error(message)])
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }
}
