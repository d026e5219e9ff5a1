//! Broadcast channel for view events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every change
//! to the status view publishes a [`ViewEvent`] through the bus, and all
//! WebSocket connections subscribe to receive them.

use tokio::sync::broadcast;

use super::ViewEvent;

/// Broadcast bus for [`ViewEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers; the next `Updated` event carries the full view, so
/// a lagging client recovers on its own.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ViewEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: ViewEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
