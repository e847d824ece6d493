//! Multi-subscriber fan-out for live-update channels.
//!
//! An [`EventBroadcaster`] hands out bounded [`Subscription`]s and delivers each
//! broadcast value to every live subscriber without ever blocking the producer.
//! A subscriber whose buffer is full simply misses that event.

mod broadcaster;
mod subscription;

pub use broadcaster::{BroadcastOutcome, EventBroadcaster};
pub use subscription::Subscription;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Subscriber registry shared by a broadcaster and its subscriptions.
///
/// Registry mutation and channel sends happen under the same lock, so a
/// subscription closing itself can never race a send into its channel.
struct Registry<T> {
    closed: bool,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<T>>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            closed: false,
            next_id: 1,
            subscribers: HashMap::new(),
        }
    }
}

fn lock_registry<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
