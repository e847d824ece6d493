//! HTTP surface: server-push event streams, manual refresh triggers and
//! Prometheus metrics.

mod requests_logging;
pub mod server;
mod sse;
pub mod state;

pub use server::{make_app, run_server};
pub use state::ServerState;
