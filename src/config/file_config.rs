use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub port: Option<u16>,

    // Feature configs
    pub refresh: Option<RefreshConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub scan_interval_secs: Option<u64>,
    pub success_refresh_interval_secs: Option<u64>,
    pub failure_retry_interval_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub max_concurrent_fetches: Option<usize>,
    pub subscriber_buffer: Option<usize>,
    pub scan_on_start: Option<bool>,
    pub public_base_path: Option<String>,
    pub user_agent: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
