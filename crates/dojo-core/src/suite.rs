//! Minimal describe/it framework for suite-style tests.
//!
//! Specs are declared up front, then `execute` runs them in declaration order
//! and drives every registered [`FrameworkReporter`] through the lifecycle.

use std::fmt::Debug;
use std::panic::AssertUnwindSafe;

pub use crate::reporter::SpecStatus;
use crate::domain::failure::TestError;
use crate::reporter::{FrameworkReporter, SpecReport, SuiteReport};

type SpecBody = Box<dyn FnOnce(&mut Expect) -> Result<(), TestError> + Send>;

/// Collects failed expectations for one spec.
#[derive(Debug, Default)]
pub struct Expect {
    failures: Vec<TestError>,
}

impl Expect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `condition` to hold.
    pub fn that(&mut self, condition: bool, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.failures.push(TestError::new(message));
        }
        self
    }

    pub fn eq<T: PartialEq + Debug>(&mut self, actual: T, expected: T) -> &mut Self {
        if actual != expected {
            self.failures.push(TestError::new(format!(
                "Expected {actual:?} to equal {expected:?}."
            )));
        }
        self
    }

    pub fn fail(&mut self, message: impl Into<String>) -> &mut Self {
        self.failures.push(TestError::new(message));
        self
    }

    pub fn record(&mut self, error: TestError) -> &mut Self {
        self.failures.push(error);
        self
    }

    pub fn failures(&self) -> &[TestError] {
        &self.failures
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    fn into_failures(self) -> Vec<TestError> {
        self.failures
    }
}

struct SpecNode {
    id: String,
    description: String,
    full_name: String,
    body: Option<SpecBody>,
}

struct SuiteNode {
    id: String,
    description: String,
    full_name: String,
    children: Vec<Node>,
}

enum Node {
    Suite(SuiteNode),
    Spec(SpecNode),
}

impl Node {
    fn spec_count(&self) -> usize {
        match self {
            Node::Spec(_) => 1,
            Node::Suite(suite) => suite.children.iter().map(Node::spec_count).sum(),
        }
    }
}

struct OpenSuite {
    id: String,
    description: String,
    children: Vec<Node>,
}

/// Counts produced by one `execute`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub total: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Framework environment handed to suite-style test definitions.
#[derive(Default)]
pub struct SuiteEnv {
    roots: Vec<Node>,
    open: Vec<OpenSuite>,
    next_spec: usize,
    next_suite: usize,
    reporters: Vec<Box<dyn FrameworkReporter>>,
}

impl SuiteEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn FrameworkReporter>) {
        self.reporters.push(reporter);
    }

    /// Group specs declared inside `define`.
    pub fn describe(&mut self, description: impl Into<String>, define: impl FnOnce(&mut Self)) {
        self.next_suite += 1;
        self.open.push(OpenSuite {
            id: format!("suite{}", self.next_suite),
            description: description.into(),
            children: Vec::new(),
        });

        define(self);

        if let Some(open) = self.open.pop() {
            let full_name = self.full_name(&open.description);
            self.push_node(Node::Suite(SuiteNode {
                id: open.id,
                description: open.description,
                full_name,
                children: open.children,
            }));
        }
    }

    /// Declare a spec. An `Err` or a panic from `body` counts as one failed
    /// expectation.
    pub fn it<F>(&mut self, description: impl Into<String>, body: F)
    where
        F: FnOnce(&mut Expect) -> Result<(), TestError> + Send + 'static,
    {
        self.declare(description.into(), Some(Box::new(body)));
    }

    /// Declare a spec that is reported as pending and never runs.
    pub fn xit(&mut self, description: impl Into<String>) {
        self.declare(description.into(), None);
    }

    pub fn spec_count(&self) -> usize {
        self.roots.iter().map(Node::spec_count).sum()
    }

    /// Run every declared spec, reporting to all reporters, then signal done.
    pub fn execute(mut self) -> SuiteSummary {
        let roots = std::mem::take(&mut self.roots);
        let total = roots.iter().map(Node::spec_count).sum();
        for reporter in &mut self.reporters {
            reporter.started(total);
        }

        let mut summary = SuiteSummary {
            total,
            ..SuiteSummary::default()
        };
        for node in roots {
            run_node(&mut self.reporters, node, &mut summary);
        }

        for reporter in &mut self.reporters {
            reporter.done();
        }
        tracing::debug!(
            total = summary.total,
            failed = summary.failed,
            pending = summary.pending,
            "suite executed"
        );
        summary
    }

    fn declare(&mut self, description: String, body: Option<SpecBody>) {
        let id = format!("spec{}", self.next_spec);
        self.next_spec += 1;
        let full_name = self.full_name(&description);
        self.push_node(Node::Spec(SpecNode {
            id,
            description,
            full_name,
            body,
        }));
    }

    fn full_name(&self, description: &str) -> String {
        self.open
            .iter()
            .map(|s| s.description.as_str())
            .chain(std::iter::once(description))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn push_node(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }
}

/// Returns whether anything under `node` failed.
fn run_node(
    reporters: &mut [Box<dyn FrameworkReporter>],
    node: Node,
    summary: &mut SuiteSummary,
) -> bool {
    match node {
        Node::Suite(suite) => {
            let started = SuiteReport {
                id: suite.id.clone(),
                description: Some(suite.description),
                full_name: Some(suite.full_name),
                status: None,
            };
            for reporter in reporters.iter_mut() {
                reporter.suite_started(&started);
            }

            let mut failed = false;
            for child in suite.children {
                failed |= run_node(reporters, child, summary);
            }

            let finished = SuiteReport {
                status: Some(if failed {
                    SpecStatus::Failed
                } else {
                    SpecStatus::Passed
                }),
                ..SuiteReport::new(suite.id)
            };
            for reporter in reporters.iter_mut() {
                reporter.suite_done(&finished);
            }
            failed
        }
        Node::Spec(spec) => {
            let started = SpecReport {
                id: spec.id.clone(),
                description: Some(spec.description),
                full_name: Some(spec.full_name),
                ..SpecReport::default()
            };
            for reporter in reporters.iter_mut() {
                reporter.spec_started(&started);
            }

            let (status, failures) = match spec.body {
                None => {
                    summary.pending += 1;
                    (SpecStatus::Pending, Vec::new())
                }
                Some(body) => {
                    let failures = run_body(body);
                    if failures.is_empty() {
                        (SpecStatus::Passed, failures)
                    } else {
                        summary.failed += 1;
                        (SpecStatus::Failed, failures)
                    }
                }
            };

            let finished = SpecReport {
                status: Some(status),
                failed_expectations: Some(failures),
                ..SpecReport::new(spec.id)
            };
            for reporter in reporters.iter_mut() {
                reporter.spec_done(&finished);
            }
            status == SpecStatus::Failed
        }
    }
}

fn run_body(body: SpecBody) -> Vec<TestError> {
    let mut expect = Expect::new();
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| body(&mut expect)));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            expect.record(error);
        }
        Err(payload) => {
            expect.record(TestError::from_panic(payload));
        }
    }
    expect.into_failures()
}
