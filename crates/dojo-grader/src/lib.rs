//! Dojo Grader
//!
//! Staged grading pipelines for markup, script and stylesheet submissions and
//! the registry that answers submissions against declared questions.
//!
//! Each submission passes static analysis, optional style analysis and a
//! structural parse before its question's dynamic test runs on the shared
//! serialized runner. The first stage that rejects the source decides the
//! response.

pub mod analysis;
pub mod markup;
pub mod position;
pub mod question;
pub mod registry;
pub mod script;
pub mod stage;
pub mod stylesheet;

pub use analysis::{
    Analyzer, AnalyzerError, Finding, MarkupNode, MarkupParser, PositionBase, StructureParser,
    Toolchain,
};
pub use markup::MarkupPipeline;
pub use question::{Pipeline, Question, QuestionDeclaration, TestDefinition, TestInput};
pub use registry::{create_registry, Registry};
pub use script::ScriptPipeline;
pub use stage::{ContentPipeline, Stage};
pub use stylesheet::StylesheetPipeline;

pub use dojo_core::{GradingOptions, OptionOverrides, Response, ResponseKind};
