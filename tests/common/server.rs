//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own entity database.

use super::constants::*;
use super::fixtures::{seed_entities, FakeResolver};
use refresh_relay::config::RefreshSettings;
use refresh_relay::events::LiveChannels;
use refresh_relay::metrics;
use refresh_relay::refresh::{RefreshCoordinator, SqliteEntityRepository};
use refresh_relay::server::{make_app, ServerState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with an isolated database.
///
/// When dropped, the server and coordinator are cancelled and temp resources
/// are cleaned up. Use [`TestServer::shutdown`] to wait for in-flight fetches.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub repository: Arc<SqliteEntityRepository>,
    pub resolver: Arc<FakeResolver>,
    pub coordinator: RefreshCoordinator,
    pub channels: LiveChannels,

    client: reqwest::Client,
    shutdown: CancellationToken,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Spawns a new test server on a random port with seeded entities.
    ///
    /// The periodic scan is effectively disabled; tests drive refreshes
    /// through the HTTP triggers.
    pub async fn spawn() -> Self {
        metrics::init_metrics();

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let repository = Arc::new(
            SqliteEntityRepository::new(temp_dir.path().join("entities.db"))
                .expect("Failed to open entity database"),
        );
        seed_entities(&repository).expect("Failed to seed entities");

        let resolver = Arc::new(FakeResolver::default());
        let settings = RefreshSettings {
            scan_interval_secs: 3600,
            scan_on_start: false,
            ..RefreshSettings::default()
        };
        let coordinator =
            RefreshCoordinator::new(resolver.clone(), repository.clone(), settings);

        let shutdown = CancellationToken::new();
        coordinator
            .start(&shutdown)
            .expect("Failed to start coordinator");

        let channels = LiveChannels::new(8);
        let app = make_app(ServerState::new(coordinator.clone(), channels.clone()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            repository,
            resolver,
            coordinator,
            channels,
            client: reqwest::Client::new(),
            shutdown,
            _temp_dir: temp_dir,
        };
        server.wait_for_ready().await;
        server
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("POST request failed")
    }

    /// Stop the coordinator, waiting for in-flight fetches, then close
    /// every event channel.
    pub async fn shutdown(&self) {
        self.coordinator.stop().await;
        self.coordinator.close_events();
        self.channels.close();
    }

    /// Waits until no fetch is in flight.
    pub async fn wait_until_idle(&self) {
        tokio::time::timeout(Duration::from_millis(FRAME_TIMEOUT_MS), async {
            while self.coordinator.in_flight_count() > 0 {
                tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
            }
        })
        .await
        .expect("Fetches still in flight");
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(self.url("/health")).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.coordinator.close_events();
        self.channels.close();
        self.shutdown.cancel();
    }
}
