//! In-process [`EntityRepository`] for tests and embedding.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::models::RefreshableRecord;
use super::policy::RefreshPolicy;
use super::repository::EntityRepository;

#[derive(Debug, Default)]
pub struct InMemoryEntityRepository {
    records: Mutex<HashMap<String, RefreshableRecord>>,
}

impl InMemoryEntityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RefreshableRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record.
    pub fn upsert_entity(&self, record: RefreshableRecord) {
        self.records().insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<RefreshableRecord> {
        self.records().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl EntityRepository for InMemoryEntityRepository {
    fn load_by_id(&self, id: &str) -> Result<Option<RefreshableRecord>> {
        Ok(self.get(id))
    }

    fn update_attempt(&self, id: &str, attempted_at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records();
        let Some(record) = records.get_mut(id) else {
            bail!("Entity not found: {}", id);
        };
        record.last_attempt_at = Some(attempted_at);
        Ok(())
    }

    fn update_resource(
        &self,
        id: &str,
        data: &[u8],
        content_type: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records();
        let Some(record) = records.get_mut(id) else {
            bail!("Entity not found: {}", id);
        };
        record.resource_data = Some(data.to_vec());
        record.content_type = content_type.to_string();
        record.fetched_at = Some(fetched_at);
        Ok(())
    }

    fn scan_stale(
        &self,
        success_interval: Duration,
        failure_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshableRecord>> {
        let policy = RefreshPolicy::new(success_interval, failure_interval);
        let mut stale: Vec<RefreshableRecord> = self
            .records()
            .values()
            .filter(|r| policy.is_eligible(r, now))
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stale)
    }
}
