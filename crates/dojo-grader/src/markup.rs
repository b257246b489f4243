//! Markup (HTML fragment) pipeline.
//!
//! Static analysis validates the fragment twice: strictly, wrapped in a
//! one-line document header, and, when that passes, permissively to catch
//! element names no browser knows.

use std::sync::{Arc, OnceLock};

use dojo_core::domain::{ContentType, ParseError};
use dojo_core::AnalyzerSettings;
use regex::Regex;
use serde_json::Value;

use crate::analysis::{require, Analyzer, AnalyzerError, Finding, MarkupNode, MarkupParser, Toolchain};
use crate::stage::{ContentPipeline, Stage};

/// Header the fragment is wrapped in for strict parsing. It occupies exactly
/// one line, so strict-parse line numbers are one ahead of the fragment's.
pub const STRICT_HEADER: &str = "<?xml version=\"1.0\"?><html>\n";
pub const STRICT_FOOTER: &str = "\n</html>";

const STRICT_ERROR_PATTERN: &str = r"error on line (\d+) at column (\d+):\s(.+)";

/// Element names HTML parsers recognise.
const HTML_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "address", "applet", "area", "article", "aside", "audio", "b",
    "base", "basefont", "bdi", "bdo", "bgsound", "big", "blockquote", "body", "br",
    "button", "canvas", "caption", "center", "cite", "code", "col", "colgroup", "data",
    "datalist", "dd", "del", "details", "dfn", "dialog", "dir", "div", "dl", "dt", "em",
    "embed", "fieldset", "figcaption", "figure", "font", "footer", "form", "frame",
    "frameset", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hgroup", "hr", "html",
    "i", "iframe", "img", "input", "ins", "isindex", "kbd", "keygen", "label", "legend", "li",
    "link", "listing", "main", "map", "mark", "marquee", "menu", "meta", "meter", "nav",
    "nobr", "noembed", "noframes", "noscript", "object", "ol", "optgroup", "option",
    "output", "p", "param", "picture", "plaintext", "pre", "progress", "q", "rp", "rt",
    "ruby", "s", "samp", "script", "search", "section", "select", "slot", "small", "source",
    "span", "strike", "strong", "style", "sub", "summary", "sup", "table", "tbody",
    "td", "template", "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track",
    "tt", "u", "ul", "var", "video", "wbr", "xmp",
];

fn strict_error() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(STRICT_ERROR_PATTERN).ok())
        .as_ref()
}

/// Whether a browser would treat `tag` as a known or custom element.
pub fn is_known_element(tag: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    tag.contains('-') || HTML_ELEMENTS.contains(&tag.as_str())
}

/// Wrap a fragment for strict parsing.
pub fn strict_document(source: &str) -> String {
    format!("{STRICT_HEADER}{source}{STRICT_FOOTER}")
}

/// Turn one strict-parser error text into a finding on the fragment's lines.
///
/// Texts without a `line N at column M` position are kept, position-less.
pub fn strict_error_finding(text: &str) -> Finding {
    let parsed = strict_error().and_then(|re| re.captures(text)).and_then(|caps| {
        let line: u32 = caps.get(1)?.as_str().parse().ok()?;
        let column: u32 = caps.get(2)?.as_str().parse().ok()?;
        let message = caps.get(3)?.as_str().trim().to_string();
        Some(Finding::new(message).at(line.saturating_sub(1).max(1), column))
    });
    parsed.unwrap_or_else(|| Finding::new(text.trim()))
}

/// Roots of foreign (SVG, MathML) content. Their subtrees are not HTML.
const FOREIGN_ROOTS: &[&str] = &["svg", "math"];

fn is_foreign_root(tag: &str) -> bool {
    FOREIGN_ROOTS.contains(&tag.to_ascii_lowercase().as_str())
}

/// `Unknown HTML element` findings for every unrecognised element, in
/// document order. Foreign subtrees are skipped.
pub fn unknown_element_findings(nodes: &[MarkupNode]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for node in nodes {
        collect_unknown(node, &mut findings);
    }
    findings
}

fn collect_unknown(node: &MarkupNode, findings: &mut Vec<Finding>) {
    let MarkupNode::Element { tag, children, .. } = node else {
        return;
    };
    if is_foreign_root(tag) {
        return;
    }
    if !is_known_element(tag) {
        findings.push(Finding::new(format!(
            "Unknown HTML element: {}",
            tag.to_ascii_uppercase()
        )));
    }
    for child in children {
        collect_unknown(child, findings);
    }
}

/// The nodes a markup test receives: the single top-level element when there
/// is exactly one, otherwise every element of the fragment.
pub fn node_set(nodes: Vec<MarkupNode>) -> Vec<MarkupNode> {
    if nodes.len() == 1 && nodes[0].is_element() {
        return nodes;
    }
    nodes
        .iter()
        .flat_map(MarkupNode::elements)
        .cloned()
        .collect()
}

const STAGES: &[Stage] = &[Stage::StaticAnalysis, Stage::Parse, Stage::DynamicTest];

pub struct MarkupPipeline {
    parser: Arc<dyn MarkupParser>,
    lint: Option<Arc<dyn Analyzer>>,
}

impl MarkupPipeline {
    pub fn new(parser: Arc<dyn MarkupParser>) -> Self {
        Self { parser, lint: None }
    }

    pub fn with_lint(mut self, lint: Arc<dyn Analyzer>) -> Self {
        self.lint = Some(lint);
        self
    }

    pub fn from_toolchain(toolchain: &Toolchain) -> Result<Self, dojo_core::ConfigError> {
        let pipeline = Self::new(require(&toolchain.markup_parser, ContentType::Markup, "markup parser")?);
        Ok(match &toolchain.markup_lint {
            Some(lint) => pipeline.with_lint(lint.clone()),
            None => pipeline,
        })
    }

    fn validate(&self, source: &str) -> Result<Vec<Finding>, AnalyzerError> {
        let strict_errors = self.parser.parse_strict(&strict_document(source));
        if !strict_errors.is_empty() {
            return Ok(strict_errors.iter().map(|t| strict_error_finding(t)).collect());
        }

        let nodes = self
            .parser
            .parse_fragment(source)
            .map_err(|e| AnalyzerError::Crashed {
                analyzer: "markup parser".to_string(),
                reason: e.message,
            })?;
        Ok(unknown_element_findings(&nodes))
    }
}

impl ContentPipeline for MarkupPipeline {
    fn content_type(&self) -> ContentType {
        ContentType::Markup
    }

    fn stages(&self) -> &'static [Stage] {
        STAGES
    }

    fn analyze(
        &self,
        _stage: Stage,
        source: &str,
        settings: &AnalyzerSettings,
    ) -> Result<Vec<Finding>, AnalyzerError> {
        let findings = self.validate(source)?;
        if !findings.is_empty() {
            return Ok(findings);
        }
        match &self.lint {
            Some(lint) => Ok(lint
                .check(source, &settings.markup_lint)?
                .into_iter()
                .map(|f| f.normalized(lint.position_base()))
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn parse(&self, source: &str) -> Result<Value, ParseError> {
        let nodes = node_set(self.parser.parse_fragment(source)?);
        serde_json::to_value(nodes).map_err(|e| ParseError::new(e.to_string()))
    }
}
