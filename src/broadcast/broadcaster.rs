use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use super::{lock_registry, Registry, Subscription};
use crate::metrics;

/// Per-call delivery summary returned by [`EventBroadcaster::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    /// Subscribers whose buffer was full; they miss this event.
    pub dropped: usize,
}

/// Fan-out of `T` values to any number of subscribers.
///
/// Cloning yields another handle to the same set of subscribers.
pub struct EventBroadcaster<T> {
    channel: &'static str,
    capacity: usize,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for EventBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            capacity: self.capacity,
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Clone + Send + 'static> EventBroadcaster<T> {
    /// Buffer size given to each subscriber by [`EventBroadcaster::new`].
    pub const DEFAULT_CAPACITY: usize = 8;

    /// Create a broadcaster. `channel` names it in logs and metrics.
    pub fn new(channel: &'static str) -> Self {
        Self::with_capacity(channel, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(channel: &'static str, capacity: usize) -> Self {
        Self {
            channel,
            capacity: capacity.max(1),
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    pub fn channel(&self) -> &'static str {
        self.channel
    }

    /// Register a new subscriber.
    ///
    /// Returns `None` once the broadcaster has been closed; callers should
    /// treat that as "no live updates", not as an error.
    pub fn subscribe(&self) -> Option<Subscription<T>> {
        let mut registry = lock_registry(&self.registry);
        if registry.closed {
            return None;
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let (tx, rx) = mpsc::channel(self.capacity);
        registry.subscribers.insert(id, tx);
        metrics::set_subscribers(self.channel, registry.subscribers.len());
        debug!(
            "Subscriber {} joined channel {} ({} total)",
            id,
            self.channel,
            registry.subscribers.len()
        );

        Some(Subscription::new(
            id,
            self.channel,
            rx,
            Arc::downgrade(&self.registry),
        ))
    }

    /// Deliver `event` to every current subscriber without blocking.
    ///
    /// A subscriber with a full buffer misses this event; the others are
    /// unaffected. No-op once closed.
    pub fn broadcast(&self, event: T) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut registry = lock_registry(&self.registry);
        if registry.closed || registry.subscribers.is_empty() {
            return outcome;
        }

        let mut disconnected = Vec::new();
        for (id, sender) in registry.subscribers.iter() {
            match sender.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => outcome.dropped += 1,
                Err(TrySendError::Closed(_)) => disconnected.push(*id),
            }
        }

        // Receivers dropped without going through Subscription::close
        for id in disconnected {
            registry.subscribers.remove(&id);
        }
        let remaining = registry.subscribers.len();
        drop(registry);

        metrics::record_broadcast(self.channel, outcome.delivered, outcome.dropped);
        metrics::set_subscribers(self.channel, remaining);
        if outcome.dropped > 0 {
            debug!(
                "Dropped event on channel {} for {} slow subscriber(s)",
                self.channel, outcome.dropped
            );
        }

        outcome
    }

    /// Close the broadcaster and end every subscription. Idempotent.
    pub fn close(&self) {
        let mut registry = lock_registry(&self.registry);
        if registry.closed {
            return;
        }
        registry.closed = true;
        let count = registry.subscribers.len();
        // Dropping the senders closes each subscriber's channel
        registry.subscribers.clear();
        drop(registry);

        metrics::set_subscribers(self.channel, 0);
        debug!("Closed channel {} ({} subscribers)", self.channel, count);
    }

    pub fn is_closed(&self) -> bool {
        lock_registry(&self.registry).closed
    }

    pub fn subscriber_count(&self) -> usize {
        lock_registry(&self.registry).subscribers.len()
    }
}
