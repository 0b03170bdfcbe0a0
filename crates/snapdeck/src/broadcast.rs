//! Refresh notifications for connected viewers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the in-process channel.
const DEFAULT_CAPACITY: usize = 16;

/// Signal pushed to viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexEvent {
    /// The index was rebuilt; viewers should re-query.
    Refresh,
}

/// Fire-and-forget push channel.
pub trait Broadcaster: Send + Sync {
    fn notify(&self, event: IndexEvent);
}

/// Broadcaster backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<IndexEvent>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn notify(&self, event: IndexEvent) {
        // No subscribers is not an error
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(?event, delivered, "Broadcast index event");
    }
}
