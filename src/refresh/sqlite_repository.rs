use super::models::RefreshableRecord;
use super::repository::EntityRepository;
use super::schema;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

const SELECT_COLUMNS: &str =
    "id, source_origin, resource_data, content_type, fetched_at, last_attempt_at";

/// [`EntityRepository`] backed by a single SQLite connection.
///
/// Timestamps are stored as unix seconds.
#[derive(Clone)]
pub struct SqliteEntityRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntityRepository {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.exists() {
            info!("Creating new entity database at {:?}", path);
        }
        let conn = Connection::open(path).context("Failed to open entity database")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record with all its columns.
    pub fn upsert_entity(&self, record: &RefreshableRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO entities
                (id, source_origin, resource_data, content_type, fetched_at, last_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                source_origin = excluded.source_origin,
                resource_data = excluded.resource_data,
                content_type = excluded.content_type,
                fetched_at = excluded.fetched_at,
                last_attempt_at = excluded.last_attempt_at",
            params![
                record.id,
                record.source_origin,
                record.resource_data,
                record.content_type,
                record.fetched_at.map(|t| t.timestamp()),
                record.last_attempt_at.map(|t| t.timestamp()),
            ],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RefreshableRecord> {
        let fetched_at: Option<i64> = row.get(4)?;
        let last_attempt_at: Option<i64> = row.get(5)?;
        Ok(RefreshableRecord {
            id: row.get(0)?,
            source_origin: row.get(1)?,
            resource_data: row.get(2)?,
            content_type: row.get(3)?,
            fetched_at: fetched_at.and_then(|t| DateTime::from_timestamp(t, 0)),
            last_attempt_at: last_attempt_at.and_then(|t| DateTime::from_timestamp(t, 0)),
        })
    }
}

impl EntityRepository for SqliteEntityRepository {
    fn load_by_id(&self, id: &str) -> Result<Option<RefreshableRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {} FROM entities WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()
            .with_context(|| format!("Failed to load entity {}", id))?;
        Ok(record)
    }

    fn update_attempt(&self, id: &str, attempted_at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE entities SET last_attempt_at = ?1 WHERE id = ?2",
            params![attempted_at.timestamp(), id],
        )?;
        if updated == 0 {
            bail!("Entity not found: {}", id);
        }
        Ok(())
    }

    fn update_resource(
        &self,
        id: &str,
        data: &[u8],
        content_type: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE entities SET resource_data = ?1, content_type = ?2, fetched_at = ?3
             WHERE id = ?4",
            params![data, content_type, fetched_at.timestamp(), id],
        )?;
        if updated == 0 {
            bail!("Entity not found: {}", id);
        }
        Ok(())
    }

    fn scan_stale(
        &self,
        success_interval: Duration,
        failure_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshableRecord>> {
        let success_cutoff = (now - success_interval).timestamp();
        let failure_cutoff = (now - failure_interval).timestamp();

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entities
             WHERE TRIM(source_origin) <> ''
               AND NOT (resource_data IS NOT NULL AND length(resource_data) > 0
                        AND fetched_at IS NOT NULL AND fetched_at > ?1)
               AND (last_attempt_at IS NULL OR last_attempt_at <= ?2)
             ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![success_cutoff, failure_cutoff], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to scan stale entities")?;
        Ok(records)
    }
}
