//! Test doubles and seed data

use super::constants::*;
use anyhow::Result;
use async_trait::async_trait;
use refresh_relay::refresh::{Asset, AssetResolver, RefreshableRecord, SqliteEntityRepository};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolver answering by origin, counting every call.
#[derive(Default)]
pub struct FakeResolver {
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetResolver for FakeResolver {
    async fn resolve_asset(&self, origin: &str) -> Result<Option<Asset>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match origin {
            PNG_ORIGIN => Ok(Some(Asset::new("image/png", PNG_BYTES.to_vec()))),
            FAILING_ORIGIN => anyhow::bail!("connection reset by peer"),
            EMPTY_ORIGIN => Ok(None),
            other => Ok(Some(Asset::new("image/x-icon", other.as_bytes().to_vec()))),
        }
    }
}

pub fn seed_entities(repository: &SqliteEntityRepository) -> Result<()> {
    for (id, origin) in [
        (PNG_ENTITY_ID, PNG_ORIGIN),
        (FAILING_ENTITY_ID, FAILING_ORIGIN),
        (EMPTY_ENTITY_ID, EMPTY_ORIGIN),
        (BLANK_ENTITY_ID, ""),
    ] {
        repository.upsert_entity(&RefreshableRecord::new(id, origin))?;
    }
    Ok(())
}
