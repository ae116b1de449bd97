//! Periodic auto-update of the project snapshot.
//!
//! [`start`] spawns a background task that forces a cache refresh every
//! interval and hands the new snapshot to a callback. Each call returns its
//! own [`PollerHandle`]; there is no shared poller state.
//!
//! Stopping cancels future ticks only. A refresh already in flight runs to
//! completion, writes the cache, and may still invoke the callback.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskboard_server::poller::{self, DEFAULT_POLL_INTERVAL};
//!
//! let handle = poller::start(cache, |snapshot| {
//!     println!("{} projects refreshed", snapshot.projects.len());
//! }, DEFAULT_POLL_INTERVAL);
//!
//! // Later:
//! handle.stop();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::ProjectCache;
use crate::types::Snapshot;

/// Default auto-update interval (5 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300_000);

/// Shortest interval accepted; zero would spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest interval accepted (one year). Larger values overflow the timer's
/// deadline arithmetic.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Handle to a running poller.
///
/// Dropping the handle stops the poller as if [`stop`](Self::stop) had been
/// called.
#[derive(Debug)]
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Cancels all future ticks. Calling it again is a no-op.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!("Stopping auto-update poller");
        }
    }

    /// Returns true once [`stop`](Self::stop) was called or the task ended.
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow() || self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the poller and waits for an in-flight tick to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(error = %err, "Auto-update poller task failed");
            }
        }
    }
}

/// Starts polling `cache` every `interval`, passing each fresh snapshot to
/// `callback`.
///
/// The first tick fires one full interval after the call. Refresh errors are
/// logged and skipped; they never reach the callback or stop the timer.
/// `interval` is clamped to [`MAX_POLL_INTERVAL`].
///
/// Must be called from within a tokio runtime.
pub fn start<F>(cache: Arc<ProjectCache>, callback: F, interval: Duration) -> PollerHandle
where
    F: Fn(Arc<Snapshot>) + Send + Sync + 'static,
{
    if interval > MAX_POLL_INTERVAL {
        warn!(
            requested_secs = interval.as_secs(),
            max_secs = MAX_POLL_INTERVAL.as_secs(),
            "Poll interval too large, clamping"
        );
    }
    let interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
    let (stop_tx, mut stop_rx) = watch::channel(false);

    info!(
        interval_ms = interval.as_millis() as u64,
        "Starting auto-update poller"
    );

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // Fires on stop() and when the handle is dropped.
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            match cache.force_read().await {
                Ok(snapshot) => {
                    debug!(
                        projects = snapshot.projects.len(),
                        "Auto-update delivered snapshot"
                    );
                    callback(snapshot);
                }
                Err(err) => {
                    error!(error = %err, "Auto-update tick failed");
                }
            }
        }

        debug!("Auto-update poller stopped");
    });

    PollerHandle {
        stop_tx,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::aggregator::Aggregator;
    use crate::asana::AsanaClient;
    use crate::cache::DEFAULT_CACHE_TTL;

    async fn live_cache(server: &MockServer) -> Arc<ProjectCache> {
        Mock::given(method("GET"))
            .and(path("/projects/P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"gid": "P1", "name": "Website", "notes": ""}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(server)
            .await;

        let client = AsanaClient::new(server.uri(), "token", None).expect("should create client");
        Arc::new(ProjectCache::new(
            Aggregator::new(client, vec!["P1".to_string()]),
            DEFAULT_CACHE_TTL,
        ))
    }

    /// A cache whose refreshes always fail without touching the network.
    fn failing_cache() -> Arc<ProjectCache> {
        let client =
            AsanaClient::new("http://127.0.0.1:1", "token", None).expect("should create client");
        Arc::new(ProjectCache::new(
            Aggregator::new(client, Vec::new()),
            DEFAULT_CACHE_TTL,
        ))
    }

    fn counting_callback() -> (Arc<AtomicUsize>, impl Fn(Arc<Snapshot>) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        (count, move |_snapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn fires_every_interval_until_stopped() {
        let server = MockServer::start().await;
        let cache = live_cache(&server).await;
        let (count, callback) = counting_callback();

        let handle = start(Arc::clone(&cache), callback, Duration::from_millis(50));

        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "first tick waits one interval");

        time::sleep(Duration::from_millis(200)).await;
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected at least two ticks, got {fired}");
        assert!(cache.read().is_some());

        handle.stop();
        assert!(handle.is_stopped());

        // Allow an in-flight refresh to land before sampling.
        time::sleep(Duration::from_millis(50)).await;
        let after_stop = count.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_reach_callback_or_stop_timer() {
        let (count, callback) = counting_callback();

        let handle = start(failing_cache(), callback, Duration::from_millis(100));

        time::sleep(Duration::from_millis(350)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!handle.is_stopped());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_interval_is_clamped() {
        let (count, callback) = counting_callback();

        let handle = start(failing_cache(), callback, Duration::from_secs(u64::MAX));

        time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_stopped(), "poller task must survive a huge interval");
        assert_eq!(count.load(Ordering::SeqCst), 0);

        time::sleep(MAX_POLL_INTERVAL).await;
        assert!(!handle.is_stopped());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (_count, callback) = counting_callback();
        let handle = start(failing_cache(), callback, Duration::from_millis(100));

        handle.stop();
        handle.stop();

        assert!(handle.is_stopped());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_task_exit() {
        let (_count, callback) = counting_callback();
        let handle = start(failing_cache(), callback, Duration::from_millis(100));

        time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn pollers_are_independent() {
        let server = MockServer::start().await;
        let cache = live_cache(&server).await;
        let (count_a, callback_a) = counting_callback();
        let (count_b, callback_b) = counting_callback();

        let handle_a = start(Arc::clone(&cache), callback_a, Duration::from_millis(40));
        let handle_b = start(Arc::clone(&cache), callback_b, Duration::from_millis(40));

        handle_a.stop();
        time::sleep(Duration::from_millis(150)).await;

        assert_eq!(count_a.load(Ordering::SeqCst), 0);
        assert!(count_b.load(Ordering::SeqCst) >= 1);
        assert!(!handle_b.is_stopped());
        handle_b.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_handle_stops_polling() {
        let server = MockServer::start().await;
        let cache = live_cache(&server).await;
        let (count, callback) = counting_callback();

        let handle = start(cache, callback, Duration::from_millis(40));
        drop(handle);

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
