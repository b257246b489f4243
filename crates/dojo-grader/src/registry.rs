//! Question registry: builds questions from declarations and answers
//! submissions against them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dojo_core::domain::{ConfigError, Response};
use dojo_core::environment::{ExecutionHost, LocalHost};
use dojo_core::{obs, GradingOptions, Runner, METRICS};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::analysis::Toolchain;
use crate::question::{Question, QuestionDeclaration};

/// Build a registry on an in-process host.
///
/// Fails on the first declaration with an unknown content type, a duplicate
/// id, invalid options or a missing collaborator.
pub fn create_registry(
    declarations: impl IntoIterator<Item = QuestionDeclaration>,
    options: GradingOptions,
    toolchain: Toolchain,
) -> Result<Registry, ConfigError> {
    let mut registry = Registry::new(options, toolchain, Arc::new(LocalHost::new()))?;
    registry.add_questions(declarations)?;
    Ok(registry)
}

/// Holds every question of a grading session and the runner their dynamic
/// tests share.
pub struct Registry {
    options: GradingOptions,
    toolchain: Toolchain,
    runner: Runner,
    questions: HashMap<String, Arc<Question>>,
    order: Vec<String>,
}

impl Registry {
    pub fn new(
        options: GradingOptions,
        toolchain: Toolchain,
        host: Arc<dyn ExecutionHost>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            options,
            toolchain,
            runner: Runner::new(host),
            questions: HashMap::new(),
            order: Vec::new(),
        })
    }

    pub fn options(&self) -> &GradingOptions {
        &self.options
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn add_question(&mut self, declaration: QuestionDeclaration) -> Result<(), ConfigError> {
        if self.questions.contains_key(&declaration.id) {
            return Err(ConfigError::DuplicateQuestion(declaration.id));
        }
        let question = Question::from_declaration(declaration, &self.options, &self.toolchain)?;
        tracing::debug!(
            question_id = %question.id(),
            content_type = %question.content_type(),
            "question registered"
        );
        self.order.push(question.id().to_string());
        self.questions
            .insert(question.id().to_string(), Arc::new(question));
        Ok(())
    }

    pub fn add_questions(
        &mut self,
        declarations: impl IntoIterator<Item = QuestionDeclaration>,
    ) -> Result<(), ConfigError> {
        for declaration in declarations {
            self.add_question(declaration)?;
        }
        Ok(())
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.get(id).map(Arc::as_ref)
    }

    /// Registered questions in registration order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.order.iter().filter_map(|id| self.question(id))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Grade `source` against question `question_id`.
    ///
    /// Always yields a response; an unknown id is an `Error` response.
    pub async fn answer(&self, question_id: &str, source: &str) -> Response {
        answer_question(
            self.questions.get(question_id).cloned(),
            question_id.to_string(),
            source.to_string(),
            self.runner.clone(),
        )
        .await
    }

    /// Grade in the background and hand the response to `callback`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn answer_with(
        &self,
        question_id: &str,
        source: impl Into<String>,
        callback: impl FnOnce(Response) + Send + 'static,
    ) -> JoinHandle<()> {
        let grading = answer_question(
            self.questions.get(question_id).cloned(),
            question_id.to_string(),
            source.into(),
            self.runner.clone(),
        );
        tokio::spawn(async move {
            callback(grading.await);
        })
    }
}

async fn answer_question(
    question: Option<Arc<Question>>,
    question_id: String,
    source: String,
    runner: Runner,
) -> Response {
    let span = obs::answer_span(&question_id, &source);
    async move {
        let Some(question) = question else {
            tracing::warn!(question_id = %question_id, "answer for unknown question");
            return Response::error(format!("unknown question: {question_id}"));
        };

        obs::emit_answer_started(&question_id, question.content_type().name());
        let started = Instant::now();
        let response = question.grade(&source, &runner).await;
        METRICS.inc_answers_graded();
        obs::emit_answer_classified(
            &question_id,
            response.kind().name(),
            response.diagnostics().len(),
            started.elapsed().as_millis() as u64,
        );
        response
    }
    .instrument(span)
    .await
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("questions", &self.order)
            .field("options", &self.options)
            .finish()
    }
}
