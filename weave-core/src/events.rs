//! In-process eventing (spec §9 "Emit-and-subscribe eventing").
//!
//! Cache and memory-pressure events are broadcast to any subscribers
//! in-process only. The broadcaster never blocks a publisher: a lagging
//! subscriber drops events rather than applying backpressure, and the drop
//! is logged at debug level.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the multi-tier cache (§4.8 "Events").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEvent {
    Set { key: String, tier: String },
    Evicted { key: String, tier: String },
    Promoted { key: String, from: String, to: String },
    Demoted { key: String, from: String, to: String },
    PressureCleanup { memory_freed: u64, pressure_level: String },
    Warmed { count: usize },
    Cleared,
    Resized { action: String, factor: f32 },
}

/// Events emitted by the memory pressure monitor (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureEvent {
    pub level: String,
    pub heap_percent: f32,
    pub rss_percent: f32,
}

/// A small broadcaster for `CacheEvent`s. Cloning a `Broadcaster` shares the
/// same underlying channel, mirroring a process-wide singleton without
/// requiring callers to reach for global mutable state directly (§9).
#[derive(Clone)]
pub struct Broadcaster<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + std::fmt::Debug> Broadcaster<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Publish an event. Never fails the caller: if there are no
    /// subscribers, or a subscriber's buffer is full, the send is a no-op
    /// from the publisher's point of view.
    pub fn publish(&self, event: T) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.sender.send(event) {
            tracing::debug!(error = ?e, "event dropped: no active subscribers");
        }
    }
}

impl<T: Clone + std::fmt::Debug> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new(1024)
    }
}

pub type CacheEventBroadcaster = Broadcaster<CacheEvent>;
pub type PressureEventBroadcaster = Broadcaster<PressureEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let b: CacheEventBroadcaster = Broadcaster::new(16);
        let mut rx = b.subscribe();
        b.publish(CacheEvent::Cleared);
        let evt = rx.recv().await.unwrap();
        assert!(matches!(evt, CacheEvent::Cleared));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let b: CacheEventBroadcaster = Broadcaster::new(16);
        b.publish(CacheEvent::Cleared);
    }
}
