//! Server-push (`text/event-stream`) responses backed by a [`Subscription`].

use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{future, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;

use crate::broadcast::Subscription;
use crate::events::{event_data, ServerPushEvent};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn to_sse_event<E: ServerPushEvent>(event: &E) -> Option<Event> {
    match event_data(event) {
        Ok(data) => Some(Event::default().event(event.event_type()).data(data)),
        Err(e) => {
            debug!("Dropping {} event that failed to serialize: {}", event.event_type(), e);
            None
        }
    }
}

/// Stream every event of `subscription` accepted by `keep` as one frame each.
///
/// The response ends when the broadcaster closes. A missing subscription
/// (closed broadcaster) is answered with 503.
pub fn event_stream<E, F>(subscription: Option<Subscription<E>>, keep: F) -> Response
where
    E: ServerPushEvent + Send + 'static,
    F: Fn(&E) -> bool + Send + 'static,
{
    let Some(subscription) = subscription else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Live updates unavailable").into_response();
    };
    debug!("Opening event stream for subscriber {}", subscription.id());

    let stream = subscription
        .into_stream()
        .filter(move |event| future::ready(keep(event)))
        .filter_map(|event| future::ready(to_sse_event(&event).map(Ok::<_, Infallible>)));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}
