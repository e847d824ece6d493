//! Shared constants for end-to-end tests

/// Entity whose origin resolves to a small PNG.
pub const PNG_ENTITY_ID: &str = "S1";
pub const PNG_ORIGIN: &str = "png.example";
pub const PNG_BYTES: [u8; 2] = [0x01, 0x02];

/// Entity whose origin always fails to resolve.
pub const FAILING_ENTITY_ID: &str = "S2";
pub const FAILING_ORIGIN: &str = "down.example";

/// Entity whose origin has no icon.
pub const EMPTY_ENTITY_ID: &str = "S3";
pub const EMPTY_ORIGIN: &str = "empty.example";

/// Entity with a blank origin.
pub const BLANK_ENTITY_ID: &str = "S4";

/// Max wait for an expected frame
pub const FRAME_TIMEOUT_MS: u64 = 5000;

/// How long to listen before concluding no frame is coming
pub const QUIET_PERIOD_MS: u64 = 300;

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;
