//! Static-analysis collaborators.
//!
//! Linters, style checkers and parsers are supplied by the host application.
//! The grader only depends on the traits below; a [`Toolchain`] bundles the
//! implementations each content type needs.

use std::collections::BTreeMap;
use std::sync::Arc;

use dojo_core::domain::{ConfigError, ContentType, Diagnostic, ParseError, ResponseKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an analyzer counts lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionBase {
    ZeroBased,
    #[default]
    OneBased,
}

/// One analyzer finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Finding {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn on_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Shift positions reported by a zero-based analyzer to one-based.
    pub fn normalized(mut self, base: PositionBase) -> Self {
        if base == PositionBase::ZeroBased {
            self.line = self.line.map(|l| l + 1);
            self.column = self.column.map(|c| c + 1);
        }
        self
    }

    pub fn into_diagnostic(self, kind: ResponseKind) -> Diagnostic {
        Diagnostic::new(kind, self.message).with_position(self.line, self.column)
    }
}

/// A collaborator failed outright instead of reporting findings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("{analyzer} failed: {reason}")]
    Crashed { analyzer: String, reason: String },

    #[error("{analyzer} rejected its settings: {reason}")]
    InvalidSettings { analyzer: String, reason: String },
}

/// Lint or style checker over raw source text.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    fn position_base(&self) -> PositionBase {
        PositionBase::OneBased
    }

    fn check(&self, source: &str, settings: &Value) -> Result<Vec<Finding>, AnalyzerError>;
}

/// Produces the structural representation handed to dynamic tests.
pub trait StructureParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Value, ParseError>;
}

/// A node of a permissively parsed markup fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkupNode {
    Element {
        tag: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<MarkupNode>,
    },
    Text {
        text: String,
    },
}

impl MarkupNode {
    pub fn element(tag: impl Into<String>, children: Vec<MarkupNode>) -> Self {
        MarkupNode::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MarkupNode::Text { text: text.into() }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let MarkupNode::Element { attributes, .. } = &mut self {
            attributes.insert(name.into(), value.into());
        }
        self
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            MarkupNode::Element { tag, .. } => Some(tag),
            MarkupNode::Text { .. } => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, MarkupNode::Element { .. })
    }

    /// This node and every element below it, in document order.
    pub fn elements(&self) -> Vec<&MarkupNode> {
        let mut out = Vec::new();
        self.collect_elements(&mut out);
        out
    }

    fn collect_elements<'a>(&'a self, out: &mut Vec<&'a MarkupNode>) {
        if let MarkupNode::Element { children, .. } = self {
            out.push(self);
            for child in children {
                child.collect_elements(out);
            }
        }
    }
}

/// Markup parser with a strict (well-formedness) and a permissive mode.
pub trait MarkupParser: Send + Sync {
    /// Parse a complete document strictly; returns the parser's error texts,
    /// empty when the document is well formed.
    fn parse_strict(&self, document: &str) -> Vec<String>;

    /// Parse a fragment the way a browser would, recovering from errors.
    fn parse_fragment(&self, source: &str) -> Result<Vec<MarkupNode>, ParseError>;
}

/// Collaborators available to the pipelines.
#[derive(Clone, Default)]
pub struct Toolchain {
    pub script_lint: Option<Arc<dyn Analyzer>>,
    pub script_style: Option<Arc<dyn Analyzer>>,
    pub script_parser: Option<Arc<dyn StructureParser>>,
    pub stylesheet_lint: Option<Arc<dyn Analyzer>>,
    pub stylesheet_parser: Option<Arc<dyn StructureParser>>,
    pub markup_parser: Option<Arc<dyn MarkupParser>>,
    pub markup_lint: Option<Arc<dyn Analyzer>>,
}

impl Toolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(
        mut self,
        lint: Arc<dyn Analyzer>,
        style: Arc<dyn Analyzer>,
        parser: Arc<dyn StructureParser>,
    ) -> Self {
        self.script_lint = Some(lint);
        self.script_style = Some(style);
        self.script_parser = Some(parser);
        self
    }

    pub fn with_stylesheet(mut self, lint: Arc<dyn Analyzer>, parser: Arc<dyn StructureParser>) -> Self {
        self.stylesheet_lint = Some(lint);
        self.stylesheet_parser = Some(parser);
        self
    }

    pub fn with_markup(mut self, parser: Arc<dyn MarkupParser>) -> Self {
        self.markup_parser = Some(parser);
        self
    }

    pub fn with_markup_lint(mut self, lint: Arc<dyn Analyzer>) -> Self {
        self.markup_lint = Some(lint);
        self
    }
}

/// Unwrap a collaborator a content type cannot do without.
pub(crate) fn require<T: ?Sized>(
    slot: &Option<Arc<T>>,
    content_type: ContentType,
    collaborator: &'static str,
) -> Result<Arc<T>, ConfigError> {
    slot.clone().ok_or_else(|| ConfigError::MissingCollaborator {
        content_type: content_type.name().to_string(),
        collaborator,
    })
}
