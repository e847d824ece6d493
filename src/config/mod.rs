mod file_config;

pub use file_config::{FileConfig, RefreshConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub scan_interval_secs: Option<u64>,
    pub success_refresh_interval_secs: Option<u64>,
    pub failure_retry_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub refresh: RefreshSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        // The database file may not exist yet, but its directory must
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let port = file.port.unwrap_or(cli.port);

        let defaults = RefreshSettings::default();
        let rf = file.refresh.unwrap_or_default();
        let refresh = RefreshSettings {
            scan_interval_secs: rf
                .scan_interval_secs
                .or(cli.scan_interval_secs)
                .unwrap_or(defaults.scan_interval_secs),
            success_refresh_interval_secs: rf
                .success_refresh_interval_secs
                .or(cli.success_refresh_interval_secs)
                .unwrap_or(defaults.success_refresh_interval_secs),
            failure_retry_interval_secs: rf
                .failure_retry_interval_secs
                .or(cli.failure_retry_interval_secs)
                .unwrap_or(defaults.failure_retry_interval_secs),
            fetch_timeout_secs: rf.fetch_timeout_secs.unwrap_or(defaults.fetch_timeout_secs),
            max_concurrent_fetches: rf
                .max_concurrent_fetches
                .unwrap_or(defaults.max_concurrent_fetches),
            subscriber_buffer: rf.subscriber_buffer.unwrap_or(defaults.subscriber_buffer),
            scan_on_start: rf.scan_on_start.unwrap_or(defaults.scan_on_start),
            public_base_path: rf.public_base_path.unwrap_or(defaults.public_base_path),
            user_agent: rf.user_agent.unwrap_or(defaults.user_agent),
        };
        refresh.validate()?;

        Ok(Self {
            db_path,
            port,
            refresh,
        })
    }
}

/// Tuning for the refresh coordinator and its resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// How often the periodic scan looks for stale entities.
    pub scan_interval_secs: u64,
    /// How long a successfully fetched resource stays fresh.
    pub success_refresh_interval_secs: u64,
    /// Minimum wait after any attempt before trying again.
    pub failure_retry_interval_secs: u64,
    /// Upper bound on a single resolver call.
    pub fetch_timeout_secs: u64,
    /// Fetches allowed to run concurrently across all entities.
    pub max_concurrent_fetches: usize,
    /// Event buffer per live subscriber.
    pub subscriber_buffer: usize,
    /// Run a scan as soon as the coordinator starts.
    pub scan_on_start: bool,
    /// Prefix of the public resource reference broadcast on refresh.
    pub public_base_path: String,
    pub user_agent: String,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 300,
            success_refresh_interval_secs: 86400, // 24 hours
            failure_retry_interval_secs: 3600,
            fetch_timeout_secs: 15,
            max_concurrent_fetches: 8,
            subscriber_buffer: 8,
            scan_on_start: true,
            public_base_path: "/icons".to_string(),
            user_agent: concat!("refresh-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RefreshSettings {
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            bail!("scan_interval_secs must be greater than 0");
        }
        if self.success_refresh_interval_secs == 0 {
            bail!("success_refresh_interval_secs must be greater than 0");
        }
        if self.failure_retry_interval_secs == 0 {
            bail!("failure_retry_interval_secs must be greater than 0");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be greater than 0");
        }
        if self.max_concurrent_fetches == 0 {
            bail!("max_concurrent_fetches must be at least 1");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn success_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.success_refresh_interval_secs as i64)
    }

    pub fn failure_retry_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.failure_retry_interval_secs as i64)
    }
}
