//! Per-run environment scope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::handle::EnvironmentHandle;
use super::host::ExecutionHost;
use crate::domain::error::EnvironmentError;
use crate::lock_unpoisoned;
use crate::metrics::METRICS;
use crate::obs;

struct FactoryInner {
    host: Arc<dyn ExecutionHost>,
    fixture_url: Option<String>,
    handles: Mutex<Vec<EnvironmentHandle>>,
    closed: AtomicBool,
}

/// Acquires environments for exactly one run and tracks every one of them so
/// the runner can release them all when the run settles.
///
/// Cheap to clone; clones share the same scope.
#[derive(Clone)]
pub struct EnvironmentFactory {
    inner: Arc<FactoryInner>,
}

impl EnvironmentFactory {
    pub fn new(host: Arc<dyn ExecutionHost>, fixture_url: Option<String>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                host,
                fixture_url,
                handles: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The fixture `acquire` loads by default.
    pub fn fixture_url(&self) -> Option<&str> {
        self.inner.fixture_url.as_deref()
    }

    /// Acquire a context preloaded with the scope's default fixture.
    pub async fn acquire(&self) -> Result<EnvironmentHandle, EnvironmentError> {
        let url = self.inner.fixture_url.clone();
        self.acquire_from(url.as_deref()).await
    }

    /// Acquire a context, loading `fixture_url` first when given.
    pub async fn acquire_from(
        &self,
        fixture_url: Option<&str>,
    ) -> Result<EnvironmentHandle, EnvironmentError> {
        if self.is_closed() {
            return Err(EnvironmentError::ScopeClosed);
        }

        let frame = self.inner.host.attach(fixture_url).await?;
        let handle = EnvironmentHandle::new(frame, self.inner.host.clone());
        METRICS.inc_environments_acquired();
        obs::emit_environment_acquired(&handle.id().to_string(), fixture_url);

        // The run may have settled while the fixture was loading.
        let mut handles = lock_unpoisoned(&self.inner.handles);
        if self.is_closed() {
            drop(handles);
            handle.release();
            return Err(EnvironmentError::ScopeClosed);
        }
        handles.push(handle.clone());
        Ok(handle)
    }

    /// Release one context; other contexts of the scope are unaffected.
    pub fn release(&self, handle: &EnvironmentHandle) {
        handle.release();
        lock_unpoisoned(&self.inner.handles).retain(|h| h.id() != handle.id());
    }

    /// Close the scope and release every context still held.
    ///
    /// Returns how many contexts this call released.
    pub fn release_all(&self) -> usize {
        let handles = {
            let mut handles = lock_unpoisoned(&self.inner.handles);
            self.inner.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *handles)
        };
        handles.iter().filter(|h| h.release()).count()
    }

    /// Contexts acquired through this scope and not yet released.
    pub fn live(&self) -> usize {
        lock_unpoisoned(&self.inner.handles)
            .iter()
            .filter(|h| !h.is_released())
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::fixture::StaticFixtures;
    use crate::environment::host::LocalHost;

    fn scope(fixture: Option<&str>) -> (Arc<LocalHost>, EnvironmentFactory) {
        let host = Arc::new(LocalHost::with_loader(Arc::new(
            StaticFixtures::new().with("fixtures/list.html", "<ul><li>one</li></ul>"),
        )));
        let factory = EnvironmentFactory::new(host.clone(), fixture.map(str::to_string));
        (host, factory)
    }

    #[tokio::test]
    async fn test_acquire_uses_default_fixture() {
        let (_host, factory) = scope(Some("fixtures/list.html"));
        let env = factory.acquire().await.unwrap();
        assert_eq!(env.fixture(), Some("<ul><li>one</li></ul>"));
        assert_eq!(factory.live(), 1);
    }

    #[tokio::test]
    async fn test_acquire_without_fixture_is_empty() {
        let (_host, factory) = scope(None);
        let env = factory.acquire().await.unwrap();
        assert!(env.fixture().is_none());
        assert!(env.globals().is_empty());
    }

    #[tokio::test]
    async fn test_release_one_leaves_others() {
        let (host, factory) = scope(None);
        let a = factory.acquire().await.unwrap();
        let b = factory.acquire().await.unwrap();
        factory.release(&a);
        factory.release(&a);
        assert!(a.is_released());
        assert!(!b.is_released());
        assert_eq!(factory.live(), 1);
        assert_eq!(host.stats().live, 1);
    }

    #[tokio::test]
    async fn test_release_all_closes_scope() {
        let (host, factory) = scope(None);
        let a = factory.acquire().await.unwrap();
        let _b = factory.acquire().await.unwrap();
        a.release();

        assert_eq!(factory.release_all(), 1);
        assert_eq!(factory.release_all(), 0);
        assert_eq!(host.stats().live, 0);
        assert!(factory.is_closed());

        let err = factory.acquire().await.unwrap_err();
        assert!(matches!(err, EnvironmentError::ScopeClosed));
        assert_eq!(host.stats().attached, 2);
    }

    #[tokio::test]
    async fn test_fixture_failure_propagates() {
        let (host, factory) = scope(None);
        let err = factory.acquire_from(Some("fixtures/missing.html")).await.unwrap_err();
        assert!(matches!(err, EnvironmentError::FixtureLoad { .. }));
        assert_eq!(factory.live(), 0);
        assert_eq!(host.stats().attached, 0);
    }
}
