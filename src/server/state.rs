use axum::extract::FromRef;
use std::time::Instant;

use crate::events::LiveChannels;
use crate::refresh::RefreshCoordinator;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub coordinator: RefreshCoordinator,
    pub channels: LiveChannels,
}

impl ServerState {
    pub fn new(coordinator: RefreshCoordinator, channels: LiveChannels) -> Self {
        Self {
            start_time: Instant::now(),
            coordinator,
            channels,
        }
    }
}

impl FromRef<ServerState> for RefreshCoordinator {
    fn from_ref(input: &ServerState) -> Self {
        input.coordinator.clone()
    }
}

impl FromRef<ServerState> for LiveChannels {
    fn from_ref(input: &ServerState) -> Self {
        input.channels.clone()
    }
}
