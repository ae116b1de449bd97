//! Single-slot snapshot cache for aggregated project data.
//!
//! The [`ProjectCache`] holds the most recent [`Snapshot`] together with the
//! instant it was stored. A snapshot younger than the validity window is
//! served as-is; otherwise the cache runs the [`Aggregator`] and replaces the
//! slot wholesale.
//!
//! # Concurrency
//!
//! The validity check and the read happen under one lock acquisition, so a
//! reader never observes a snapshot that expired between the two. Refreshes
//! are serialized: when several callers miss at once, the first one runs the
//! aggregator and the others wait for it and then reuse its snapshot.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskboard_server::cache::{ProjectCache, DEFAULT_CACHE_TTL};
//!
//! let cache = Arc::new(ProjectCache::new(aggregator, DEFAULT_CACHE_TTL));
//!
//! // First call fetches, the second one within five minutes does not.
//! let first = cache.get(false).await?;
//! let second = cache.get(false).await?;
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::aggregator::Aggregator;
use crate::error::DashboardError;
use crate::types::{Project, Snapshot};

/// Default validity window (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    stored_at: Instant,
}

/// Thread-safe single-slot cache in front of an [`Aggregator`].
#[derive(Debug)]
pub struct ProjectCache {
    aggregator: Aggregator,

    /// Validity window for a stored snapshot.
    ttl: Duration,

    /// The stored snapshot, protected by a read-write lock.
    slot: RwLock<Option<CacheEntry>>,

    /// Held for the duration of a refresh.
    refresh_lock: Mutex<()>,
}

impl ProjectCache {
    /// Creates an empty cache.
    pub fn new(aggregator: Aggregator, ttl: Duration) -> Self {
        debug!(ttl_secs = ttl.as_secs(), "Creating project cache");
        Self {
            aggregator,
            ttl,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns the validity window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the stored snapshot if it is still within the validity window.
    pub fn read(&self) -> Option<Arc<Snapshot>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);

        match slot.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                trace!(age_ms = entry.stored_at.elapsed().as_millis() as u64, "Cache hit");
                Some(Arc::clone(&entry.snapshot))
            }
            Some(_) => {
                trace!("Cache entry expired");
                None
            }
            None => {
                trace!("Cache empty");
                None
            }
        }
    }

    /// Replaces the stored snapshot and resets its timestamp.
    ///
    /// Returns the snapshot that is now stored.
    pub fn write(&self, projects: Vec<Project>) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot::new(projects));

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CacheEntry {
            snapshot: Arc::clone(&snapshot),
            stored_at: Instant::now(),
        });

        debug!(projects = snapshot.projects.len(), "Stored new snapshot");
        snapshot
    }

    /// Age of the stored snapshot, valid or not.
    pub fn age(&self) -> Option<Duration> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|entry| entry.stored_at.elapsed())
    }

    /// Runs the aggregator regardless of validity and stores the result.
    ///
    /// # Errors
    ///
    /// Returns the aggregator's error; the stored snapshot is left untouched.
    pub async fn force_read(&self) -> Result<Arc<Snapshot>, DashboardError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh().await
    }

    /// Returns the cached snapshot, refreshing it on a miss or when forced.
    ///
    /// # Errors
    ///
    /// Returns the aggregator's error when a refresh was needed and failed.
    pub async fn get(&self, force_refresh: bool) -> Result<Arc<Snapshot>, DashboardError> {
        if force_refresh {
            return self.force_read().await;
        }

        if let Some(snapshot) = self.read() {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while this one waited.
        if let Some(snapshot) = self.read() {
            trace!("Reusing snapshot from concurrent refresh");
            return Ok(snapshot);
        }

        self.refresh().await
    }

    async fn refresh(&self) -> Result<Arc<Snapshot>, DashboardError> {
        debug!("Refreshing project snapshot");
        let projects = self.aggregator.aggregate().await?;
        Ok(self.write(projects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asana::AsanaClient;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn offline_cache(ttl: Duration) -> ProjectCache {
        let client =
            AsanaClient::new("http://127.0.0.1:1", "token", None).expect("should create client");
        ProjectCache::new(Aggregator::new(client, vec!["P1".to_string()]), ttl)
    }

    async fn mock_upstream(server: &MockServer, expected_rounds: u64) {
        Mock::given(method("GET"))
            .and(path("/projects/P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"gid": "P1", "name": "Website", "notes": ""}
            })))
            .expect(expected_rounds)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .expect(expected_rounds)
            .mount(server)
            .await;
    }

    fn live_cache(server: &MockServer, ttl: Duration) -> ProjectCache {
        let client = AsanaClient::new(server.uri(), "token", None).expect("should create client");
        ProjectCache::new(Aggregator::new(client, vec!["P1".to_string()]), ttl)
    }

    // ==================== read/write tests ====================

    #[test]
    fn read_misses_when_empty() {
        let cache = offline_cache(DEFAULT_CACHE_TTL);
        assert!(cache.read().is_none());
        assert!(cache.age().is_none());
    }

    #[tokio::test]
    async fn write_then_read_returns_same_snapshot() {
        let cache = offline_cache(DEFAULT_CACHE_TTL);

        let written = cache.write(Vec::new());
        let read = cache.read().expect("should hit");

        assert!(Arc::ptr_eq(&written, &read));
    }

    #[tokio::test(start_paused = true)]
    async fn read_misses_once_window_elapses() {
        let cache = offline_cache(DEFAULT_CACHE_TTL);
        cache.write(Vec::new());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.read().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.read().is_none());
        assert_eq!(cache.age(), Some(Duration::from_secs(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn write_replaces_snapshot_and_resets_age() {
        let cache = offline_cache(DEFAULT_CACHE_TTL);
        let first = cache.write(Vec::new());

        tokio::time::advance(Duration::from_secs(200)).await;
        let second = cache.write(Vec::new());

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.age(), Some(Duration::ZERO));
        let read = cache.read().expect("should hit");
        assert!(Arc::ptr_eq(&second, &read));
    }

    // ==================== get/force_read tests ====================

    #[tokio::test]
    async fn get_within_window_does_not_refetch() {
        let server = MockServer::start().await;
        mock_upstream(&server, 1).await;
        let cache = live_cache(&server, DEFAULT_CACHE_TTL);

        let first = assert_ok!(cache.get(false).await);
        let second = assert_ok!(cache.get(false).await);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.projects.len(), 1);
    }

    #[tokio::test]
    async fn get_with_force_refetches() {
        let server = MockServer::start().await;
        mock_upstream(&server, 2).await;
        let cache = live_cache(&server, DEFAULT_CACHE_TTL);

        let first = assert_ok!(cache.get(false).await);
        let second = assert_ok!(cache.get(true).await);

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn get_after_window_refetches() {
        let server = MockServer::start().await;
        mock_upstream(&server, 2).await;
        let cache = live_cache(&server, Duration::from_millis(50));

        let first = assert_ok!(cache.get(false).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = assert_ok!(cache.get(false).await);

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_refresh() {
        let server = MockServer::start().await;
        mock_upstream(&server, 1).await;
        let cache = live_cache(&server, DEFAULT_CACHE_TTL);

        let (a, b) = tokio::join!(cache.get(false), cache.get(false));

        let a = assert_ok!(a);
        let b = assert_ok!(b);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn force_read_stores_result() {
        let server = MockServer::start().await;
        mock_upstream(&server, 1).await;
        let cache = live_cache(&server, DEFAULT_CACHE_TTL);

        let forced = assert_ok!(cache.force_read().await);
        let read = cache.read().expect("should hit");

        assert!(Arc::ptr_eq(&forced, &read));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let client =
            AsanaClient::new("http://127.0.0.1:1", "token", None).expect("should create client");
        let cache = ProjectCache::new(Aggregator::new(client, Vec::new()), DEFAULT_CACHE_TTL);
        let stored = cache.write(Vec::new());

        assert_err!(cache.force_read().await);

        let read = cache.read().expect("should still hit");
        assert!(Arc::ptr_eq(&stored, &read));
    }
}
