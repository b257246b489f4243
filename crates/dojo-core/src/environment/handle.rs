//! Opaque handle to one acquired execution context.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::task::AbortHandle;

use super::host::{ContextFrame, ContextId, ExecutionHost};
use crate::domain::failure::{ErrorOrigin, TestError};
use crate::lock_unpoisoned;
use crate::metrics::METRICS;
use crate::obs;

struct HandleInner {
    frame: ContextFrame,
    host: Arc<dyn ExecutionHost>,
    globals: Mutex<Map<String, Value>>,
    tasks: Mutex<Vec<AbortHandle>>,
    released: AtomicBool,
}

impl HandleInner {
    /// Detach from the host exactly once and stop background work.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        for task in lock_unpoisoned(&self.tasks).drain(..) {
            task.abort();
        }
        self.host.detach(self.frame.id);
        METRICS.inc_environments_released();
        obs::emit_environment_released(&self.frame.id.to_string());
        true
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.release();
    }
}

/// A disposable isolated global context.
///
/// Clones share the same context. The context is detached on the first
/// `release`, or when the last clone is dropped.
#[derive(Clone)]
pub struct EnvironmentHandle {
    inner: Arc<HandleInner>,
}

impl EnvironmentHandle {
    pub(crate) fn new(frame: ContextFrame, host: Arc<dyn ExecutionHost>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                frame,
                host,
                globals: Mutex::new(Map::new()),
                tasks: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.frame.id
    }

    pub fn fixture_url(&self) -> Option<&str> {
        self.inner.frame.fixture_url.as_deref()
    }

    /// Content of the loaded fixture, if one was requested.
    pub fn fixture(&self) -> Option<&str> {
        self.inner.frame.fixture.as_deref()
    }

    pub fn set_global(&self, key: impl Into<String>, value: Value) {
        lock_unpoisoned(&self.inner.globals).insert(key.into(), value);
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        lock_unpoisoned(&self.inner.globals).get(key).cloned()
    }

    pub fn globals(&self) -> Map<String, Value> {
        lock_unpoisoned(&self.inner.globals).clone()
    }

    /// Raise an error from inside the context, outside the test's own
    /// control flow. A released context can no longer raise.
    ///
    /// Returns `true` when the host's interceptor consumed the error.
    pub fn raise(&self, error: TestError) -> bool {
        if self.is_released() {
            tracing::debug!(
                context_id = %self.id(),
                message = %error.message,
                "ignoring error raised by a released context"
            );
            return false;
        }
        self.inner
            .host
            .report_uncaught(error.with_origin(ErrorOrigin::Uncaught))
    }

    /// Run background work owned by this context.
    ///
    /// A panic inside `future` is raised as an uncaught error; releasing the
    /// context aborts the work.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_released() {
            return;
        }
        let weak: Weak<HandleInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(future).catch_unwind().await {
                if let Some(inner) = weak.upgrade() {
                    EnvironmentHandle { inner }.raise(TestError::from_panic(payload));
                }
            }
        });
        let mut tasks = lock_unpoisoned(&self.inner.tasks);
        // release() flips the flag before draining under this lock.
        if self.is_released() {
            task.abort();
            return;
        }
        tasks.push(task.abort_handle());
    }

    /// Detach the context. Safe to call repeatedly; returns `true` only for
    /// the call that actually released it.
    pub fn release(&self) -> bool {
        self.inner.release()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("id", &self.id())
            .field("fixture_url", &self.fixture_url())
            .field("released", &self.is_released())
            .finish()
    }
}
