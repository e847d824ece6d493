use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use refresh_relay::config;
use refresh_relay::events::LiveChannels;
use refresh_relay::metrics;
use refresh_relay::refresh::{HttpIconResolver, RefreshCoordinator, SqliteEntityRepository};
use refresh_relay::server::{run_server, ServerState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite entity database. Created if missing.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3002)]
    pub port: u16,

    /// Seconds between stale resource scans.
    #[clap(long)]
    pub scan_interval_secs: Option<u64>,

    /// Seconds a successfully fetched resource stays fresh.
    #[clap(long)]
    pub success_refresh_interval_secs: Option<u64>,

    /// Seconds to wait after any attempt before fetching again.
    #[clap(long)]
    pub failure_retry_interval_secs: Option<u64>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            port: args.port,
            scan_interval_secs: args.scan_interval_secs,
            success_refresh_interval_secs: args.success_refresh_interval_secs,
            failure_retry_interval_secs: args.failure_retry_interval_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_path: {:?}", app_config.db_path);
    info!("  port: {}", app_config.port);
    info!("  refresh: {:?}", app_config.refresh);

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening entity database at {:?}...", app_config.db_path);
    let repository = Arc::new(SqliteEntityRepository::new(&app_config.db_path)?);
    let resolver = Arc::new(HttpIconResolver::from_settings(&app_config.refresh)?);

    let shutdown_token = CancellationToken::new();
    let coordinator = RefreshCoordinator::new(resolver, repository, app_config.refresh.clone());
    coordinator.start(&shutdown_token)?;

    // Relayed only; producers live in applications embedding the library
    let channels = LiveChannels::new(app_config.refresh.subscriber_buffer);
    let state = ServerState::new(coordinator.clone(), channels.clone());

    let result = tokio::select! {
        result = run_server(state, app_config.port, shutdown_token.clone()) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    // Let in-flight fetches persist before closing the streams they feed
    coordinator.stop().await;
    coordinator.close_events();
    channels.close();
    shutdown_token.cancel();
    info!("Shutdown complete");

    result
}
