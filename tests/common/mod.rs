//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{EventStreamReader, TestServer, PNG_ENTITY_ID};
//!
//! #[tokio::test]
//! async fn test_refresh_stream() {
//!     let server = TestServer::spawn().await;
//!     let mut events = EventStreamReader::connect(&server.url("/v1/events/refresh")).await;
//!     server.post(&format!("/v1/refresh/{}", PNG_ENTITY_ID)).await;
//!     let frame = events.next_frame().await.unwrap();
//!     assert_eq!(frame.event, "resource_refreshed");
//! }
//! ```

mod constants;
mod event_stream;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use constants::*;
pub use event_stream::{EventStreamReader, Frame};
#[allow(unused_imports)]
pub use fixtures::FakeResolver;
pub use server::TestServer;
