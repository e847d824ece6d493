//! SQLite schema for the entity database.
//!
//! `PRAGMA user_version` holds `BASE_DB_VERSION + <schema version>`. A new
//! database runs every migration in order; an existing one runs the ones it
//! has not seen yet.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::info;

pub const BASE_DB_VERSION: i64 = 99999;

/// Migration `i` takes the schema from version `i` to version `i + 1`.
const MIGRATIONS: &[&str] = &[
    // Version 1 - entities and their cached resource
    "CREATE TABLE entities (
        id TEXT PRIMARY KEY,
        source_origin TEXT NOT NULL DEFAULT '',
        resource_data BLOB,
        content_type TEXT NOT NULL DEFAULT '',
        fetched_at INTEGER,
        last_attempt_at INTEGER
    );
    CREATE INDEX idx_entities_fetched_at ON entities (fetched_at);
    CREATE INDEX idx_entities_last_attempt_at ON entities (last_attempt_at);",
];

pub fn latest_version() -> i64 {
    MIGRATIONS.len() as i64
}

fn read_version(conn: &Connection) -> Result<i64> {
    let raw: i64 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .context("Failed to read database version")?;
    // A brand new SQLite file reports 0
    if raw == 0 {
        return Ok(0);
    }
    let version = raw - BASE_DB_VERSION;
    if version < 1 {
        bail!(
            "Entity database version {} is invalid, does not contain base db version {}",
            raw,
            BASE_DB_VERSION
        );
    }
    Ok(version)
}

/// Bring the database up to the latest schema version.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let current = read_version(conn)?;
    let latest = latest_version();

    if current > latest {
        bail!(
            "Entity database version {} is too new (max supported: {})",
            current,
            latest
        );
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let to_version = index as i64 + 1;
        info!("Migrating entity database to version {}", to_version);
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to run migration to version {}", to_version))?;
    }
    tx.execute_batch(&format!(
        "PRAGMA user_version = {};",
        BASE_DB_VERSION + latest
    ))?;
    tx.commit()?;
    Ok(())
}
