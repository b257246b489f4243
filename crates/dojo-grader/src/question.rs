//! Questions: a content type, a test definition and the options to grade with.

use std::future::Future;
use std::sync::Arc;

use dojo_core::domain::{ConfigError, ContentType, ErrorOrigin, Response, TestError};
use dojo_core::environment::{EnvironmentFactory, EnvironmentHandle};
use dojo_core::{Done, GradingOptions, OptionOverrides, Reporter, Run, RunContext, Runner, SuiteEnv};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::{self, JoinError};

use crate::analysis::Toolchain;
use crate::markup::MarkupPipeline;
use crate::script::ScriptPipeline;
use crate::stage::{classify_failure, run_static_stages, ContentPipeline};
use crate::stylesheet::StylesheetPipeline;

/// Everything a test definition gets to look at.
#[derive(Clone)]
pub struct TestInput {
    /// The submission as typed by the learner.
    pub source: String,

    /// Structural representation built by the parse stage.
    pub parsed: Value,

    /// Environment acquired for this test, question fixture loaded.
    pub environment: EnvironmentHandle,

    /// Scope for acquiring further environments; all are released with the run.
    pub environments: EnvironmentFactory,
}

type SyncTest = dyn Fn(&TestInput) -> Result<(), TestError> + Send + Sync;
type CallbackTest = dyn Fn(TestInput, Done) -> BoxFuture<'static, Result<(), TestError>> + Send + Sync;
type SuiteTest = dyn Fn(&mut SuiteEnv, &TestInput) + Send + Sync;

/// An author-supplied test, in one of three styles. All of them settle the
/// run exactly once.
#[derive(Clone)]
pub enum TestDefinition {
    /// Returns `Err` (or panics) on failure.
    Sync(Arc<SyncTest>),

    /// Settles through the `Done` handle it is given.
    Callback(Arc<CallbackTest>),

    /// Declares specs against a suite environment.
    Suite(Arc<SuiteTest>),
}

impl TestDefinition {
    pub fn sync(test: impl Fn(&TestInput) -> Result<(), TestError> + Send + Sync + 'static) -> Self {
        TestDefinition::Sync(Arc::new(test))
    }

    pub fn callback<F, Fut>(test: F) -> Self
    where
        F: Fn(TestInput, Done) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        TestDefinition::Callback(Arc::new(move |input: TestInput, done: Done| {
            test(input, done).boxed()
        }))
    }

    pub fn suite(test: impl Fn(&mut SuiteEnv, &TestInput) + Send + Sync + 'static) -> Self {
        TestDefinition::Suite(Arc::new(test))
    }

    pub fn style(&self) -> &'static str {
        match self {
            TestDefinition::Sync(_) => "sync",
            TestDefinition::Callback(_) => "callback",
            TestDefinition::Suite(_) => "suite",
        }
    }

    /// Synchronous bodies run on the blocking pool so a body that never
    /// returns cannot hold off the run's deadline.
    async fn run(self, input: TestInput, done: Done) -> Result<(), TestError> {
        match self {
            TestDefinition::Sync(test) => {
                joined(task::spawn_blocking(move || test(&input)).await)??;
                done.succeed();
            }
            TestDefinition::Callback(test) => test(input, done).await?,
            TestDefinition::Suite(test) => {
                let mut reporter = Reporter::new();
                reporter.attach_complete_listener(move |failures| {
                    done.fail_suite(failures.unwrap_or_default());
                });
                joined(
                    task::spawn_blocking(move || {
                        let mut env = SuiteEnv::new();
                        test(&mut env, &input);
                        env.add_reporter(Box::new(reporter));
                        env.execute();
                    })
                    .await,
                )?;
            }
        }
        Ok(())
    }
}

/// Surface a panic on the blocking pool as the test's own panic.
fn joined<T>(result: Result<T, JoinError>) -> Result<T, TestError> {
    result.map_err(|e| {
        if e.is_panic() {
            TestError::from_panic(e.into_panic())
        } else {
            TestError::new("test body was cancelled").with_origin(ErrorOrigin::Setup)
        }
    })
}

impl std::fmt::Debug for TestDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestDefinition::{}", self.style())
    }
}

/// How a question is declared before registration.
#[derive(Debug, Clone)]
pub struct QuestionDeclaration {
    pub id: String,

    /// Content type name; aliases such as `html` or `js` are accepted.
    pub content_type: String,

    pub test: Option<TestDefinition>,
    pub fixture_url: Option<String>,
    pub options: OptionOverrides,
}

impl QuestionDeclaration {
    pub fn new(id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            test: None,
            fixture_url: None,
            options: OptionOverrides::default(),
        }
    }

    pub fn with_test(mut self, test: TestDefinition) -> Self {
        self.test = Some(test);
        self
    }

    pub fn with_fixture(mut self, url: impl Into<String>) -> Self {
        self.fixture_url = Some(url.into());
        self
    }

    pub fn with_options(mut self, options: OptionOverrides) -> Self {
        self.options = options;
        self
    }
}

/// The closed set of content pipelines.
pub enum Pipeline {
    Markup(MarkupPipeline),
    Script(ScriptPipeline),
    Stylesheet(StylesheetPipeline),
}

impl Pipeline {
    pub fn for_content_type(content_type: ContentType, toolchain: &Toolchain) -> Result<Self, ConfigError> {
        Ok(match content_type {
            ContentType::Markup => Pipeline::Markup(MarkupPipeline::from_toolchain(toolchain)?),
            ContentType::Script => Pipeline::Script(ScriptPipeline::from_toolchain(toolchain)?),
            ContentType::Stylesheet => {
                Pipeline::Stylesheet(StylesheetPipeline::from_toolchain(toolchain)?)
            }
        })
    }

    pub fn content(&self) -> &dyn ContentPipeline {
        match self {
            Pipeline::Markup(p) => p,
            Pipeline::Script(p) => p,
            Pipeline::Stylesheet(p) => p,
        }
    }
}

/// A registered, immutable question.
pub struct Question {
    id: String,
    content_type: ContentType,
    test: Option<TestDefinition>,
    fixture_url: Option<String>,
    options: GradingOptions,
    pipeline: Pipeline,
}

impl Question {
    /// Resolve a declaration against the global options and the toolchain.
    pub fn from_declaration(
        declaration: QuestionDeclaration,
        global: &GradingOptions,
        toolchain: &Toolchain,
    ) -> Result<Self, ConfigError> {
        let content_type: ContentType = declaration.content_type.parse()?;
        let options = global.merged(&declaration.options)?;
        let pipeline = Pipeline::for_content_type(content_type, toolchain)?;
        Ok(Self {
            id: declaration.id,
            content_type,
            test: declaration.test,
            fixture_url: declaration.fixture_url,
            options,
            pipeline,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn fixture_url(&self) -> Option<&str> {
        self.fixture_url.as_deref()
    }

    pub fn options(&self) -> &GradingOptions {
        &self.options
    }

    pub fn test(&self) -> Option<&TestDefinition> {
        self.test.as_ref()
    }

    /// Grade one submission: static stages, then the dynamic test on `runner`.
    pub async fn grade(&self, source: &str, runner: &Runner) -> Response {
        let pipeline = self.pipeline.content();
        let parsed = match run_static_stages(pipeline, source, &self.options) {
            Ok(parsed) => parsed,
            Err(response) => return response,
        };

        let Some(test) = self.test.clone() else {
            return Response::success();
        };

        match runner.execute(self.dynamic_run(test, source.to_string(), parsed)).await {
            Ok(()) => Response::success(),
            Err(failure) => classify_failure(pipeline, failure, &self.options),
        }
    }

    fn dynamic_run(&self, test: TestDefinition, source: String, parsed: Value) -> Run {
        Run::new(move |ctx: RunContext| async move {
            let RunContext { done, environments } = ctx;
            let environment = match environments.acquire().await {
                Ok(environment) => environment,
                Err(e) => {
                    done.fail(TestError::new(e.to_string()).with_origin(ErrorOrigin::Setup));
                    return Ok(());
                }
            };
            let input = TestInput {
                source,
                parsed,
                environment,
                environments,
            };
            test.run(input, done).await
        })
        .with_label(self.id.clone())
        .with_timeout(self.options.timeout())
        .with_fixture(self.fixture_url.clone())
    }
}

impl std::fmt::Debug for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Question")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("test", &self.test)
            .field("fixture_url", &self.fixture_url)
            .field("options", &self.options)
            .finish()
    }
}
