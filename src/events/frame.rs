use serde::Serialize;

/// An event that can be pushed to clients over an event stream.
pub trait ServerPushEvent: Serialize {
    /// Value of the frame's `event:` line.
    fn event_type(&self) -> &'static str;
}

/// The JSON carried on the frame's `data:` line.
pub fn event_data<E: ServerPushEvent>(event: &E) -> Result<String, serde_json::Error> {
    // serde_json escapes newlines inside strings, so the payload stays on one line
    serde_json::to_string(event)
}

/// Encode one event-stream frame: an `event:` line, a single-line JSON
/// `data:` line and a blank terminator line.
pub fn encode_frame<E: ServerPushEvent>(event: &E) -> Result<String, serde_json::Error> {
    let data = event_data(event)?;
    Ok(format!("event: {}\ndata: {}\n\n", event.event_type(), data))
}
