//! Event-stream reducer for suite-style tests.
//!
//! A suite framework reports its lifecycle through [`FrameworkReporter`].
//! [`Reporter`] folds that stream into one list of failures and hands it to
//! every complete-listener exactly once, when the framework signals it is done.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::failure::{FailureRecord, TestError};

/// Outcome of one spec or suite as reported by the framework.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Passed,
    Failed,
    Pending,
}

/// A (possibly partial) spec report. Reports for the same id are merged;
/// `None` fields leave earlier values in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpecReport {
    pub id: String,
    pub description: Option<String>,
    pub full_name: Option<String>,
    pub status: Option<SpecStatus>,
    pub failed_expectations: Option<Vec<TestError>>,
}

impl SpecReport {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn merge(&mut self, update: &SpecReport) {
        if update.description.is_some() {
            self.description = update.description.clone();
        }
        if update.full_name.is_some() {
            self.full_name = update.full_name.clone();
        }
        if update.status.is_some() {
            self.status = update.status;
        }
        if update.failed_expectations.is_some() {
            self.failed_expectations = update.failed_expectations.clone();
        }
    }

    /// Best available name: full name, then description, then id.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A (possibly partial) suite report, merged by id like [`SpecReport`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuiteReport {
    pub id: String,
    pub description: Option<String>,
    pub full_name: Option<String>,
    pub status: Option<SpecStatus>,
}

impl SuiteReport {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn merge(&mut self, update: &SuiteReport) {
        if update.description.is_some() {
            self.description = update.description.clone();
        }
        if update.full_name.is_some() {
            self.full_name = update.full_name.clone();
        }
        if update.status.is_some() {
            self.status = update.status;
        }
    }
}

/// Lifecycle callbacks a suite framework drives.
pub trait FrameworkReporter: Send {
    fn started(&mut self, _total_specs: usize) {}
    fn suite_started(&mut self, _suite: &SuiteReport) {}
    fn spec_started(&mut self, _spec: &SpecReport) {}
    fn spec_done(&mut self, _spec: &SpecReport) {}
    fn suite_done(&mut self, _suite: &SuiteReport) {}
    fn done(&mut self) {}
}

/// Receives the accumulated failures, or `None` when the run passed.
pub type CompleteListener = Box<dyn FnOnce(Option<Vec<FailureRecord>>) + Send>;

#[derive(Debug, Clone)]
struct TrackedSpec {
    report: SpecReport,
    suite_id: Option<String>,
}

/// Reduces framework events into a failure list.
#[derive(Default)]
pub struct Reporter {
    listeners: Vec<CompleteListener>,
    started: bool,
    finished: bool,
    suite_stack: Vec<String>,
    suites: HashMap<String, SuiteReport>,
    specs: HashMap<String, TrackedSpec>,
    failures: Vec<FailureRecord>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners must be attached before the run starts.
    pub fn attach_complete_listener(
        &mut self,
        listener: impl FnOnce(Option<Vec<FailureRecord>>) + Send + 'static,
    ) {
        if self.started {
            tracing::warn!("complete listener attached after the run started");
        }
        self.listeners.push(Box::new(listener));
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn suite(&self, id: &str) -> Option<&SuiteReport> {
        self.suites.get(id)
    }

    pub fn spec(&self, id: &str) -> Option<&SpecReport> {
        self.specs.get(id).map(|t| &t.report)
    }

    /// Id of the suite that was innermost when the spec started.
    pub fn spec_suite(&self, id: &str) -> Option<&str> {
        self.specs.get(id).and_then(|t| t.suite_id.as_deref())
    }

    fn merge_suite(&mut self, suite: &SuiteReport) {
        self.suites
            .entry(suite.id.clone())
            .or_insert_with(|| SuiteReport::new(suite.id.clone()))
            .merge(suite);
    }

    fn merge_spec(&mut self, spec: &SpecReport) -> &TrackedSpec {
        let tracked = self
            .specs
            .entry(spec.id.clone())
            .or_insert_with(|| TrackedSpec {
                report: SpecReport::new(spec.id.clone()),
                suite_id: None,
            });
        tracked.report.merge(spec);
        tracked
    }
}

impl FrameworkReporter for Reporter {
    fn started(&mut self, _total_specs: usize) {
        self.started = true;
    }

    fn suite_started(&mut self, suite: &SuiteReport) {
        self.merge_suite(suite);
        self.suite_stack.push(suite.id.clone());
    }

    fn spec_started(&mut self, spec: &SpecReport) {
        let current = self.suite_stack.last().cloned();
        self.merge_spec(spec);
        if let Some(tracked) = self.specs.get_mut(&spec.id) {
            tracked.suite_id = current;
        }
    }

    fn spec_done(&mut self, spec: &SpecReport) {
        let report = self.merge_spec(spec).report.clone();
        if report.status != Some(SpecStatus::Failed) {
            return;
        }

        let name = report.display_name().to_string();
        let expectations = report.failed_expectations.unwrap_or_default();
        if expectations.is_empty() {
            self.failures.push(FailureRecord::new(
                name,
                TestError::new("spec failed without a recorded expectation"),
            ));
            return;
        }
        for error in expectations {
            self.failures.push(FailureRecord::new(name.clone(), error));
        }
    }

    fn suite_done(&mut self, suite: &SuiteReport) {
        self.merge_suite(suite);
        if let Some(pos) = self.suite_stack.iter().rposition(|id| *id == suite.id) {
            self.suite_stack.truncate(pos);
        }
    }

    fn done(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let failures = (!self.failures.is_empty()).then(|| self.failures.clone());
        for listener in self.listeners.drain(..) {
            listener(failures.clone());
        }
    }
}
