use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::requests_logging::log_requests;
use super::sse::event_stream;
use super::state::ServerState;
use crate::events::LiveChannels;
use crate::metrics;
use crate::refresh::RefreshCoordinator;

#[derive(Debug, Default, Deserialize)]
struct RefreshStreamQuery {
    entity_id: Option<String>,
}

async fn stream_refresh_events(
    State(coordinator): State<RefreshCoordinator>,
    Query(query): Query<RefreshStreamQuery>,
) -> Response {
    // Visibility rules belong to the caller; this only narrows to one entity
    event_stream(coordinator.subscribe(), move |event| {
        query
            .entity_id
            .as_deref()
            .map_or(true, |id| id == event.entity_id)
    })
}

async fn stream_record_events(State(channels): State<LiveChannels>) -> Response {
    event_stream(channels.records.subscribe(), |_| true)
}

async fn stream_submission_events(State(channels): State<LiveChannels>) -> Response {
    event_stream(channels.submissions.subscribe(), |_| true)
}

async fn trigger_refresh(State(coordinator): State<RefreshCoordinator>) -> Response {
    if !coordinator.is_running() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let triggered = coordinator.trigger_scheduled_refresh();
    (StatusCode::ACCEPTED, Json(json!({ "triggered": triggered }))).into_response()
}

async fn refresh_entity(
    State(coordinator): State<RefreshCoordinator>,
    Path(id): Path<String>,
) -> Response {
    if !coordinator.is_running() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let scheduled = coordinator.schedule_fetch_by_id(&id);
    (StatusCode::ACCEPTED, Json(json!({ "scheduled": scheduled }))).into_response()
}

async fn get_metrics() -> Response {
    (StatusCode::OK, metrics::gather()).into_response()
}

async fn get_health(State(state): State<ServerState>) -> Response {
    Json(json!({
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "refresh_running": state.coordinator.is_running(),
        "refreshes_in_flight": state.coordinator.in_flight_count(),
    }))
    .into_response()
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/v1/events/refresh", get(stream_refresh_events))
        .route("/v1/events/records", get(stream_record_events))
        .route("/v1/events/submissions", get(stream_submission_events))
        .route("/v1/refresh", post(trigger_refresh))
        .route("/v1/refresh/{id}", post(refresh_entity))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
}

/// Serve until `shutdown` is cancelled. Open event streams end when their
/// broadcasters are closed.
pub async fn run_server(state: ServerState, port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
