//! Staleness and backoff rules deciding whether an entity gets fetched.

use chrono::{DateTime, Duration, Utc};

use super::models::RefreshableRecord;
use crate::config::RefreshSettings;

/// Where a record stands relative to the refresh rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Blank origin; never fetched.
    NoOrigin,
    /// Fetched successfully within the success-refresh interval.
    Fresh,
    /// Attempted within the failure-retry interval.
    BackedOff,
    /// Stale or never fetched, and not backed off.
    Eligible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub success_refresh_interval: Duration,
    pub failure_retry_interval: Duration,
}

impl RefreshPolicy {
    pub fn new(success_refresh_interval: Duration, failure_retry_interval: Duration) -> Self {
        Self {
            success_refresh_interval,
            failure_retry_interval,
        }
    }

    pub fn state(&self, record: &RefreshableRecord, now: DateTime<Utc>) -> RefreshState {
        if !record.has_origin() {
            return RefreshState::NoOrigin;
        }

        if record.has_resource() {
            if let Some(fetched_at) = record.fetched_at {
                if now - fetched_at < self.success_refresh_interval {
                    return RefreshState::Fresh;
                }
            }
        }

        if let Some(last_attempt_at) = record.last_attempt_at {
            if now - last_attempt_at < self.failure_retry_interval {
                return RefreshState::BackedOff;
            }
        }

        RefreshState::Eligible
    }

    pub fn is_eligible(&self, record: &RefreshableRecord, now: DateTime<Utc>) -> bool {
        self.state(record, now) == RefreshState::Eligible
    }
}

impl From<&RefreshSettings> for RefreshPolicy {
    fn from(settings: &RefreshSettings) -> Self {
        Self::new(
            settings.success_refresh_interval(),
            settings.failure_retry_interval(),
        )
    }
}
