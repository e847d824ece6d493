//! Live-update events and their server-push wire format.
//!
//! Three independent channels exist: resource refresh completions (owned by
//! the [`RefreshCoordinator`](crate::refresh::RefreshCoordinator)), record
//! creation notifications and test-harness submissions (both owned by
//! [`LiveChannels`]).

mod frame;

pub use frame::{encode_frame, event_data, ServerPushEvent};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::EventBroadcaster;

/// A cached resource has been refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshEvent {
    pub entity_id: String,
    /// Versioned public reference to the refreshed resource.
    pub public_resource_reference: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl ServerPushEvent for RefreshEvent {
    fn event_type(&self) -> &'static str {
        "resource_refreshed"
    }
}

/// A record has been created for an entity (e.g. a feedback message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordCreatedEvent {
    pub entity_id: String,
    pub record_id: String,
    pub kind: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl ServerPushEvent for RecordCreatedEvent {
    fn event_type(&self) -> &'static str {
        "record_created"
    }
}

/// A payload was submitted to a test harness endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEvent {
    pub harness_id: String,
    pub submission_id: String,
    pub payload: serde_json::Value,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub received_at: DateTime<Utc>,
}

impl ServerPushEvent for SubmissionEvent {
    fn event_type(&self) -> &'static str {
        "submission"
    }
}

/// Broadcasters for the record and submission channels.
///
/// The server only relays these. Producers are whatever embeds the library
/// and holds a clone, such as the code that stores new records or receives
/// harness submissions; the standalone binary has none, so its streams stay
/// idle until it is embedded.
#[derive(Clone)]
pub struct LiveChannels {
    pub records: EventBroadcaster<RecordCreatedEvent>,
    pub submissions: EventBroadcaster<SubmissionEvent>,
}

impl LiveChannels {
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            records: EventBroadcaster::with_capacity("records", subscriber_buffer),
            submissions: EventBroadcaster::with_capacity("submissions", subscriber_buffer),
        }
    }

    pub fn close(&self) {
        self.records.close();
        self.submissions.close();
    }
}

impl Default for LiveChannels {
    fn default() -> Self {
        Self::new(EventBroadcaster::<RecordCreatedEvent>::DEFAULT_CAPACITY)
    }
}
