//! Request logging middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info};

pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    info!(">>> {} {}", method, uri);
    let response = next.run(request).await;

    // For event streams this is the time to first byte, not the stream lifetime
    debug!(
        "<<< {} {} {} ({}ms)",
        method,
        uri,
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}
