//! Script pipeline: lint, style, parse, then the dynamic test.

use std::sync::Arc;

use dojo_core::domain::{ConfigError, ContentType, Diagnostic, FailureRecord, ParseError};
use dojo_core::AnalyzerSettings;
use serde_json::Value;

use crate::analysis::{require, Analyzer, AnalyzerError, Finding, StructureParser, Toolchain};
use crate::position::resolve_script_failure;
use crate::stage::{ContentPipeline, Stage};

const STAGES: &[Stage] = &[
    Stage::StaticAnalysis,
    Stage::StyleAnalysis,
    Stage::Parse,
    Stage::DynamicTest,
];

pub struct ScriptPipeline {
    lint: Arc<dyn Analyzer>,
    style: Arc<dyn Analyzer>,
    parser: Arc<dyn StructureParser>,
}

impl ScriptPipeline {
    pub fn new(
        lint: Arc<dyn Analyzer>,
        style: Arc<dyn Analyzer>,
        parser: Arc<dyn StructureParser>,
    ) -> Self {
        Self {
            lint,
            style,
            parser,
        }
    }

    pub fn from_toolchain(toolchain: &Toolchain) -> Result<Self, ConfigError> {
        Ok(Self::new(
            require(&toolchain.script_lint, ContentType::Script, "lint analyzer")?,
            require(&toolchain.script_style, ContentType::Script, "style checker")?,
            require(&toolchain.script_parser, ContentType::Script, "parser")?,
        ))
    }
}

fn run_analyzer(
    analyzer: &dyn Analyzer,
    source: &str,
    settings: &Value,
) -> Result<Vec<Finding>, AnalyzerError> {
    let base = analyzer.position_base();
    Ok(analyzer
        .check(source, settings)?
        .into_iter()
        .map(|f| f.normalized(base))
        .collect())
}

impl ContentPipeline for ScriptPipeline {
    fn content_type(&self) -> ContentType {
        ContentType::Script
    }

    fn stages(&self) -> &'static [Stage] {
        STAGES
    }

    fn analyze(
        &self,
        stage: Stage,
        source: &str,
        settings: &AnalyzerSettings,
    ) -> Result<Vec<Finding>, AnalyzerError> {
        match stage {
            Stage::StyleAnalysis => run_analyzer(self.style.as_ref(), source, &settings.script_style),
            _ => run_analyzer(self.lint.as_ref(), source, &settings.script_lint),
        }
    }

    fn parse(&self, source: &str) -> Result<Value, ParseError> {
        self.parser.parse(source)
    }

    fn resolve_failure(&self, record: &FailureRecord, detailed: bool) -> Diagnostic {
        resolve_script_failure(record, detailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PositionBase;
    use crate::stage::run_static_stages;
    use dojo_core::domain::ResponseKind;
    use dojo_core::GradingOptions;
    use serde_json::json;
    use std::sync::Mutex;

    /// Reports a finding for every line containing `needle`, recording the
    /// settings it was called with.
    struct LineMatcher {
        needle: &'static str,
        base: PositionBase,
        seen_settings: Mutex<Vec<Value>>,
    }

    impl LineMatcher {
        fn new(needle: &'static str, base: PositionBase) -> Arc<Self> {
            Arc::new(Self {
                needle,
                base,
                seen_settings: Mutex::new(Vec::new()),
            })
        }
    }

    impl Analyzer for LineMatcher {
        fn name(&self) -> &str {
            self.needle
        }

        fn position_base(&self) -> PositionBase {
            self.base
        }

        fn check(&self, source: &str, settings: &Value) -> Result<Vec<Finding>, AnalyzerError> {
            self.seen_settings.lock().unwrap().push(settings.clone());
            Ok(source
                .lines()
                .enumerate()
                .filter_map(|(i, line)| {
                    line.find(self.needle)
                        .map(|col| Finding::new(format!("found {}", self.needle)).at(i as u32, col as u32))
                })
                .collect())
        }
    }

    struct JsonParser;

    impl StructureParser for JsonParser {
        fn parse(&self, source: &str) -> Result<Value, ParseError> {
            if source.contains("{{") {
                return Err(ParseError::new("Unexpected token {"));
            }
            Ok(json!({"type": "Program", "length": source.len()}))
        }
    }

    fn pipeline() -> (ScriptPipeline, Arc<LineMatcher>, Arc<LineMatcher>) {
        let lint = LineMatcher::new("eval(", PositionBase::ZeroBased);
        let style = LineMatcher::new("\t", PositionBase::OneBased);
        (
            ScriptPipeline::new(lint.clone(), style.clone(), Arc::new(JsonParser)),
            lint,
            style,
        )
    }

    #[test]
    fn test_lint_findings_are_normalized() {
        let (pipeline, _, _) = pipeline();
        let response = run_static_stages(&pipeline, "var a;\nvar b = eval(x);", &GradingOptions::default())
            .unwrap_err();
        assert_eq!(response.kind(), ResponseKind::Lint);
        let diagnostic = &response.diagnostics()[0];
        assert_eq!((diagnostic.line, diagnostic.column), (Some(2), Some(9)));
    }

    #[test]
    fn test_style_after_clean_lint() {
        let (pipeline, _, style) = pipeline();
        let mut options = GradingOptions::default();
        options.analyzers.script_style = json!({"validateIndentation": 2});

        let response = run_static_stages(&pipeline, "if (a) {\n\tb();\n}", &options).unwrap_err();
        assert_eq!(response.kind(), ResponseKind::Style);
        assert_eq!(style.seen_settings.lock().unwrap()[0]["validateIndentation"], 2);
    }

    #[test]
    fn test_lint_short_circuits_style() {
        let (pipeline, _, style) = pipeline();
        let _ = run_static_stages(&pipeline, "eval(\t)", &GradingOptions::default());
        assert!(style.seen_settings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_error() {
        let (pipeline, _, _) = pipeline();
        let response = run_static_stages(&pipeline, "var a = {{", &GradingOptions::default()).unwrap_err();
        assert_eq!(response.kind(), ResponseKind::Error);
        assert_eq!(response.diagnostics()[0].message, "Unexpected token {");
        assert!(!response.diagnostics()[0].has_position());
    }

    #[test]
    fn test_clean_source_is_parsed() {
        let (pipeline, lint, _) = pipeline();
        let parsed = run_static_stages(&pipeline, "var a = 1;", &GradingOptions::default()).unwrap();
        assert_eq!(parsed["type"], "Program");
        assert_eq!(lint.seen_settings.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_style_checker_is_config_error() {
        let toolchain = Toolchain {
            script_lint: Some(LineMatcher::new("x", PositionBase::OneBased)),
            script_parser: Some(Arc::new(JsonParser)),
            ..Toolchain::default()
        };
        let err = ScriptPipeline::from_toolchain(&toolchain).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCollaborator { collaborator: "style checker", .. }));
    }
}
