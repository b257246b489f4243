//! Serialized test runner.
//!
//! Runs one dynamic test at a time. Each run settles exactly once, through the
//! first of:
//! - its `Done` handle (success or failure)
//! - its action returning an error or panicking
//! - an uncaught error reported to the host while the run is in flight
//! - its deadline elapsing
//!
//! On settlement the uncaught-error hook and the deadline are torn down and
//! every environment the run acquired is released, before the settle callback
//! fires and before the next queued run starts.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::failure::{
    ErrorOrigin, FailureRecord, RunFailure, RunOutcome, TestError,
};
use crate::environment::{EnvironmentFactory, ExecutionHost};
use crate::lock_unpoisoned;
use crate::metrics::METRICS;
use crate::obs;

type Action = Box<dyn FnOnce(RunContext) -> BoxFuture<'static, Result<(), TestError>> + Send>;

/// Callback receiving a run's settlement.
pub type SettleCallback = Box<dyn FnOnce(RunOutcome) + Send>;

/// Completion handle for one run. Consumed by settling, so a run can only be
/// completed once through it.
pub struct Done {
    tx: oneshot::Sender<RunOutcome>,
}

impl Done {
    fn channel() -> (Self, oneshot::Receiver<RunOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn succeed(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, error: TestError) {
        self.finish(Err(RunFailure::Error(error)));
    }

    /// Settle with the failures a suite reported; none means success.
    pub fn fail_suite(self, records: Vec<FailureRecord>) {
        if records.is_empty() {
            self.succeed();
        } else {
            self.finish(Err(RunFailure::Suite(records)));
        }
    }

    /// Callback-style settlement: `None` is success.
    pub fn settle(self, error: Option<TestError>) {
        match error {
            Some(error) => self.fail(error),
            None => self.succeed(),
        }
    }

    pub fn finish(self, outcome: RunOutcome) {
        // The receiver is gone once the run settled some other way.
        let _ = self.tx.send(outcome);
    }
}

/// What a run's action receives.
pub struct RunContext {
    pub done: Done,

    /// Environment scope of this run; released when the run settles.
    pub environments: EnvironmentFactory,
}

/// One unit of queued work.
pub struct Run {
    label: String,
    action: Action,
    on_settle: Option<SettleCallback>,
    timeout: Option<Duration>,
    fixture_url: Option<String>,
}

impl Run {
    /// Create a run from an async action.
    ///
    /// The action settles the run through `ctx.done`. Returning `Err` settles
    /// it as thrown; returning `Ok` without having settled leaves the run in
    /// flight as long as `Done` is still held somewhere.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: FnOnce(RunContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        Self {
            label: "run".to_string(),
            action: Box::new(move |ctx| action(ctx).boxed()),
            on_settle: None,
            timeout: None,
            fixture_url: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Default fixture for environments acquired by this run.
    pub fn with_fixture(mut self, fixture_url: Option<String>) -> Self {
        self.fixture_url = fixture_url;
        self
    }

    pub fn on_settle(mut self, callback: impl FnOnce(RunOutcome) + Send + 'static) -> Self {
        self.on_settle = Some(Box::new(callback));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Removes the uncaught-error hook when dropped.
struct InterceptorGuard<'a> {
    host: &'a dyn ExecutionHost,
}

impl<'a> InterceptorGuard<'a> {
    fn install(host: &'a dyn ExecutionHost, tx: mpsc::UnboundedSender<TestError>) -> Self {
        host.set_uncaught_handler(Some(Arc::new(move |error: TestError| {
            METRICS.inc_uncaught_consumed();
            let _ = tx.send(error);
        })));
        Self { host }
    }
}

impl Drop for InterceptorGuard<'_> {
    fn drop(&mut self) {
        self.host.set_uncaught_handler(None);
    }
}

#[derive(Default)]
struct RunnerState {
    queue: VecDeque<Run>,
    running: bool,
}

struct RunnerInner {
    host: Arc<dyn ExecutionHost>,
    state: Mutex<RunnerState>,
}

/// FIFO, one-in-flight runner. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<RunnerInner>,
}

impl Runner {
    pub fn new(host: Arc<dyn ExecutionHost>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                host,
                state: Mutex::new(RunnerState::default()),
            }),
        }
    }

    pub fn host(&self) -> &Arc<dyn ExecutionHost> {
        &self.inner.host
    }

    /// Queue a run. Starts immediately when idle, otherwise after every run
    /// submitted before it has settled.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, run: Run) {
        {
            let mut state = lock_unpoisoned(&self.inner.state);
            if state.running {
                state.queue.push_back(run);
                return;
            }
            state.running = true;
        }
        tokio::spawn(self.inner.clone().drive(run));
    }

    /// Submit a run and wait for its settlement.
    pub async fn execute(&self, mut run: Run) -> RunOutcome {
        let (tx, rx) = oneshot::channel();
        let previous = run.on_settle.take();
        run.on_settle = Some(Box::new(move |outcome: RunOutcome| {
            if let Some(callback) = previous {
                callback(outcome.clone());
            }
            let _ = tx.send(outcome);
        }));
        self.submit(run);
        rx.await.unwrap_or_else(|_| {
            Err(RunFailure::Error(
                TestError::new("runner stopped before the run settled")
                    .with_origin(ErrorOrigin::Setup),
            ))
        })
    }

    /// No run in flight and nothing queued.
    pub fn is_idle(&self) -> bool {
        !lock_unpoisoned(&self.inner.state).running
    }

    /// Runs waiting behind the one in flight.
    pub fn queued(&self) -> usize {
        lock_unpoisoned(&self.inner.state).queue.len()
    }
}

impl RunnerInner {
    async fn drive(self: Arc<Self>, first: Run) {
        let mut next = Some(first);
        while let Some(run) = next {
            self.execute_one(run).await;
            next = {
                let mut state = lock_unpoisoned(&self.state);
                let run = state.queue.pop_front();
                if run.is_none() {
                    state.running = false;
                }
                run
            };
        }
    }

    async fn execute_one(&self, run: Run) {
        let Run {
            label,
            action,
            on_settle,
            timeout,
            fixture_url,
        } = run;
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("dojo.run", run_id = %run_id, label = %label);

        async {
            let queued_behind = lock_unpoisoned(&self.state).queue.len();
            obs::emit_run_started(&run_id, &label, queued_behind);
            METRICS.inc_runs_started();
            let started = Instant::now();

            let environments = EnvironmentFactory::new(self.host.clone(), fixture_url);
            let (done, mut done_rx) = Done::channel();
            let (uncaught_tx, mut uncaught_rx) = mpsc::unbounded_channel();
            let interceptor = InterceptorGuard::install(self.host.as_ref(), uncaught_tx);

            let ctx = RunContext {
                done,
                environments: environments.clone(),
            };
            let mut action_fut = match std::panic::catch_unwind(AssertUnwindSafe(|| action(ctx))) {
                Ok(fut) => AssertUnwindSafe(fut).catch_unwind().boxed(),
                Err(payload) => future::ready(Err(payload)).boxed(),
            };
            let deadline = async {
                match timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => future::pending::<()>().await,
                }
            };
            tokio::pin!(deadline);

            let mut action_finished = false;
            let outcome: RunOutcome = loop {
                tokio::select! {
                    biased;

                    settled = &mut done_rx => {
                        break settled.unwrap_or_else(|_| Err(TestError::abandoned().into()));
                    }
                    result = &mut action_fut, if !action_finished => {
                        action_finished = true;
                        match result {
                            Ok(Ok(())) => continue,
                            Ok(Err(error)) => {
                                let error = if error.origin == ErrorOrigin::Assertion {
                                    error.with_origin(ErrorOrigin::Thrown)
                                } else {
                                    error
                                };
                                break Err(error.into());
                            }
                            Err(payload) => break Err(TestError::from_panic(payload).into()),
                        }
                    }
                    Some(error) = uncaught_rx.recv() => {
                        break Err(error.with_origin(ErrorOrigin::Uncaught).into());
                    }
                    _ = &mut deadline => {
                        METRICS.inc_runs_timed_out();
                        let limit_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
                        obs::emit_run_timed_out(&run_id, &label, limit_ms);
                        break Err(TestError::timed_out().into());
                    }
                }
            };

            drop(interceptor);
            drop(action_fut);
            let released = environments.release_all();
            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(released, "run resources released");
            obs::emit_run_settled(&run_id, &label, duration_ms, outcome.is_ok());

            if let Some(callback) = on_settle {
                if std::panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
                    tracing::error!(run_id = %run_id, "settle callback panicked");
                }
            }
        }
        .instrument(span)
        .await
    }
}
