//! Snapshot broadcasting for live dashboard subscribers.
//!
//! The auto-update poller hands every fresh [`Snapshot`] to a
//! [`SnapshotBroadcaster`], which fans it out to all connected WebSocket
//! clients through a tokio broadcast channel.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use taskboard_server::broadcast::SnapshotBroadcaster;
//! use taskboard_server::types::Snapshot;
//!
//! let broadcaster = SnapshotBroadcaster::new();
//! let mut rx = broadcaster.subscribe();
//!
//! broadcaster.broadcast(Arc::new(Snapshot::new(Vec::new())));
//!
//! let snapshot = rx.try_recv().expect("snapshot should be queued");
//! assert!(snapshot.is_empty());
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::types::Snapshot;

/// Default channel capacity.
///
/// Snapshots arrive minutes apart; a subscriber that falls this far behind
/// only needs the newest one anyway.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Fan-out hub for aggregated snapshots.
///
/// `SnapshotBroadcaster` is `Clone`; clones share the same channel.
#[derive(Debug, Clone)]
pub struct SnapshotBroadcaster {
    sender: Sender<Arc<Snapshot>>,
}

impl SnapshotBroadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster with the specified channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created snapshot broadcaster");
        Self { sender }
    }

    /// Subscribes to snapshots broadcast from now on.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Sends a snapshot to all current subscribers.
    ///
    /// Returns the number of subscribers reached, 0 if there are none.
    pub fn broadcast(&self, snapshot: Arc<Snapshot>) -> usize {
        let projects = snapshot.projects.len();

        match self.sender.send(snapshot) {
            Ok(receivers) => {
                trace!(receivers, projects, "Snapshot broadcast");
                receivers
            }
            Err(_) => {
                trace!("No active subscribers for snapshot");
                0
            }
        }
    }

    /// Returns the current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SnapshotBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
