//! Refresh Relay Library
//!
//! Background refresh of entity resources with live server-push
//! notifications, plus the broadcast and scheduling primitives it is built on.

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod events;
pub mod metrics;
pub mod refresh;
pub mod scheduler;
pub mod server;

// Re-export commonly used types for convenience
pub use broadcast::{BroadcastOutcome, EventBroadcaster, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{LiveChannels, RecordCreatedEvent, RefreshEvent, SubmissionEvent};
pub use refresh::{
    Asset, AssetResolver, EntityRepository, HttpIconResolver, InMemoryEntityRepository,
    RefreshCoordinator, RefreshableRecord, SqliteEntityRepository,
};
pub use scheduler::{PeriodicTask, ScheduleSettings, Scheduler, TriggerSource};
pub use server::{make_app, run_server, ServerState};
