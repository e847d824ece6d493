use std::sync::{Mutex, Weak};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use super::{lock_registry, Registry};
use crate::metrics;

/// One live observer of an [`EventBroadcaster`](super::EventBroadcaster).
///
/// Events are delivered FIFO into a bounded buffer. The subscription ends when
/// either side closes it: [`Subscription::close`] (or dropping it) removes it
/// from the broadcaster, and closing the broadcaster ends every subscription,
/// after which [`Subscription::recv`] drains what is buffered and returns `None`.
pub struct Subscription<T> {
    id: u64,
    channel: &'static str,
    receiver: mpsc::Receiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
    closed: bool,
}

impl<T> Subscription<T> {
    pub(super) fn new(
        id: u64,
        channel: &'static str,
        receiver: mpsc::Receiver<T>,
        registry: Weak<Mutex<Registry<T>>>,
    ) -> Self {
        Self {
            id,
            channel,
            receiver,
            registry,
            closed: false,
        }
    }

    /// Broadcaster-assigned identifier, increasing with each subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once the subscription is closed
    /// and its buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Direct access to the underlying receive channel.
    pub fn events(&mut self) -> &mut mpsc::Receiver<T> {
        &mut self.receiver
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Unregister from the broadcaster and close the channel. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(registry) = self.registry.upgrade() {
            let mut registry = lock_registry(&registry);
            if registry.subscribers.remove(&self.id).is_some() {
                metrics::set_subscribers(self.channel, registry.subscribers.len());
                debug!(
                    "Subscriber {} left channel {} ({} remaining)",
                    self.id,
                    self.channel,
                    registry.subscribers.len()
                );
            }
        }

        self.receiver.close();
    }

    /// Turn the subscription into a stream of events. The subscription is
    /// closed when the stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + 'static
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.recv().await?;
            Some((event, subscription))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("closed", &self.closed)
            .finish()
    }
}
