//! Stylesheet pipeline: lint, parse, then the dynamic test.

use std::sync::Arc;

use dojo_core::domain::{ConfigError, ContentType, ParseError};
use dojo_core::AnalyzerSettings;
use serde_json::Value;

use crate::analysis::{require, Analyzer, AnalyzerError, Finding, StructureParser, Toolchain};
use crate::stage::{ContentPipeline, Stage};

const STAGES: &[Stage] = &[Stage::StaticAnalysis, Stage::Parse, Stage::DynamicTest];

pub struct StylesheetPipeline {
    lint: Arc<dyn Analyzer>,
    parser: Arc<dyn StructureParser>,
}

impl StylesheetPipeline {
    pub fn new(lint: Arc<dyn Analyzer>, parser: Arc<dyn StructureParser>) -> Self {
        Self { lint, parser }
    }

    pub fn from_toolchain(toolchain: &Toolchain) -> Result<Self, ConfigError> {
        Ok(Self::new(
            require(&toolchain.stylesheet_lint, ContentType::Stylesheet, "lint analyzer")?,
            require(&toolchain.stylesheet_parser, ContentType::Stylesheet, "parser")?,
        ))
    }
}

impl ContentPipeline for StylesheetPipeline {
    fn content_type(&self) -> ContentType {
        ContentType::Stylesheet
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
        let base = self.lint.position_base();
        Ok(self
            .lint
            .check(source, &settings.stylesheet_lint)?
            .into_iter()
            .map(|f| f.normalized(base))
            .collect())
    }

    fn parse(&self, source: &str) -> Result<Value, ParseError> {
        self.parser.parse(source)
    }
}
