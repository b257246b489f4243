//! The host execution substrate: isolated contexts and the uncaught-error hook.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fixture::{DefaultFixtureLoader, FixtureLoader};
use crate::domain::error::EnvironmentError;
use crate::domain::failure::TestError;
use crate::lock_unpoisoned;
use crate::obs;

/// Identity of one isolated context registered with a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What the host hands back for a freshly attached context.
#[derive(Debug, Clone)]
pub struct ContextFrame {
    pub id: ContextId,
    pub fixture_url: Option<String>,

    /// Loaded fixture content, present iff a fixture URL was given.
    pub fixture: Option<String>,
}

/// Receives uncaught errors while installed.
pub type UncaughtHandler = Arc<dyn Fn(TestError) + Send + Sync>;

/// Host capabilities the environment layer and runner depend on.
#[async_trait]
pub trait ExecutionHost: Send + Sync {
    /// Create an isolated context, loading `fixture_url` before returning.
    async fn attach(&self, fixture_url: Option<&str>) -> Result<ContextFrame, EnvironmentError>;

    /// Destroy a context. Unknown or already detached ids are ignored.
    fn detach(&self, id: ContextId);

    /// Install (`Some`) or remove (`None`) the host's uncaught-error hook.
    /// A host serves one runner, so at most one hook is installed at a time.
    fn set_uncaught_handler(&self, handler: Option<UncaughtHandler>);

    /// Deliver an uncaught error. Returns `true` when a handler consumed it.
    fn report_uncaught(&self, error: TestError) -> bool;
}

/// Counters a host keeps about its contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub attached: u64,
    pub detached: u64,
    pub live: usize,
}

/// In-process host: contexts are bookkeeping entries plus their fixture text.
pub struct LocalHost {
    loader: Arc<dyn FixtureLoader>,
    live: Mutex<HashSet<ContextId>>,
    attached: AtomicU64,
    detached: AtomicU64,
    handler: Mutex<Option<UncaughtHandler>>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::with_loader(Arc::new(DefaultFixtureLoader::new()))
    }

    pub fn with_loader(loader: Arc<dyn FixtureLoader>) -> Self {
        Self {
            loader,
            live: Mutex::new(HashSet::new()),
            attached: AtomicU64::new(0),
            detached: AtomicU64::new(0),
            handler: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            attached: self.attached.load(Ordering::SeqCst),
            detached: self.detached.load(Ordering::SeqCst),
            live: lock_unpoisoned(&self.live).len(),
        }
    }

    pub fn is_live(&self, id: ContextId) -> bool {
        lock_unpoisoned(&self.live).contains(&id)
    }

    pub fn has_uncaught_handler(&self) -> bool {
        lock_unpoisoned(&self.handler).is_some()
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionHost for LocalHost {
    async fn attach(&self, fixture_url: Option<&str>) -> Result<ContextFrame, EnvironmentError> {
        let fixture = match fixture_url {
            Some(url) => Some(self.loader.load(url).await.map_err(|e| {
                EnvironmentError::FixtureLoad {
                    url: url.to_string(),
                    reason: format!("{e:#}"),
                }
            })?),
            None => None,
        };

        let id = ContextId::new();
        lock_unpoisoned(&self.live).insert(id);
        self.attached.fetch_add(1, Ordering::SeqCst);

        Ok(ContextFrame {
            id,
            fixture_url: fixture_url.map(str::to_string),
            fixture,
        })
    }

    fn detach(&self, id: ContextId) {
        if lock_unpoisoned(&self.live).remove(&id) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn set_uncaught_handler(&self, handler: Option<UncaughtHandler>) {
        *lock_unpoisoned(&self.handler) = handler;
    }

    fn report_uncaught(&self, error: TestError) -> bool {
        // Clone out so the handler runs without the lock held.
        let handler = lock_unpoisoned(&self.handler).clone();
        match handler {
            Some(handler) => {
                obs::emit_uncaught_consumed(&error.message);
                handler(error);
                true
            }
            None => {
                obs::emit_uncaught_unhandled(&error.message);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::fixture::StaticFixtures;

    fn host() -> LocalHost {
        LocalHost::with_loader(Arc::new(
            StaticFixtures::new().with("fixtures/form.html", "<form></form>"),
        ))
    }

    #[tokio::test]
    async fn test_attach_without_fixture() {
        let host = host();
        let frame = host.attach(None).await.unwrap();
        assert!(frame.fixture.is_none());
        assert!(host.is_live(frame.id));
        assert_eq!(host.stats().live, 1);
    }

    #[tokio::test]
    async fn test_attach_loads_fixture_first() {
        let host = host();
        let frame = host.attach(Some("fixtures/form.html")).await.unwrap();
        assert_eq!(frame.fixture.as_deref(), Some("<form></form>"));
        assert_eq!(frame.fixture_url.as_deref(), Some("fixtures/form.html"));
    }

    #[tokio::test]
    async fn test_attach_missing_fixture_registers_nothing() {
        let host = host();
        let err = host.attach(Some("fixtures/nope.html")).await.unwrap_err();
        assert!(matches!(err, EnvironmentError::FixtureLoad { .. }));
        assert_eq!(host.stats(), HostStats::default());
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let host = host();
        let a = host.attach(None).await.unwrap();
        let b = host.attach(None).await.unwrap();
        host.detach(a.id);
        host.detach(a.id);
        assert!(!host.is_live(a.id));
        assert!(host.is_live(b.id));
        assert_eq!(
            host.stats(),
            HostStats {
                attached: 2,
                detached: 1,
                live: 1
            }
        );
    }

    #[test]
    fn test_report_uncaught_without_handler() {
        let host = host();
        assert!(!host.report_uncaught(TestError::new("nobody listening")));
    }

    #[test]
    fn test_report_uncaught_with_handler() {
        let host = host();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        host.set_uncaught_handler(Some(Arc::new(move |err: TestError| {
            sink.lock().unwrap().push(err.message);
        })));
        assert!(host.has_uncaught_handler());
        assert!(host.report_uncaught(TestError::new("boom")));

        host.set_uncaught_handler(None);
        assert!(!host.report_uncaught(TestError::new("late")));
        assert_eq!(*seen.lock().unwrap(), vec!["boom".to_string()]);
    }
}
