use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use super::models::RefreshableRecord;

/// Persistence for refreshable records.
///
/// Implementations serialize their own writes; the coordinator issues at most
/// one attempt write and one resource write per fetch.
pub trait EntityRepository: Send + Sync {
    fn load_by_id(&self, id: &str) -> Result<Option<RefreshableRecord>>;

    /// Record that a fetch was attempted at `attempted_at`, whatever its outcome.
    fn update_attempt(&self, id: &str, attempted_at: DateTime<Utc>) -> Result<()>;

    /// Store a successfully fetched resource.
    fn update_resource(
        &self,
        id: &str,
        data: &[u8],
        content_type: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Records with an origin that are neither fresh nor backed off at `now`.
    fn scan_stale(
        &self,
        success_interval: Duration,
        failure_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshableRecord>>;
}
