//! Client side of the server-push event streams

use super::constants::*;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// One decoded `event:`/`data:` frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

type ChunkStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

pub struct EventStreamReader {
    chunks: ChunkStream,
    buffer: String,
}

impl EventStreamReader {
    /// Open a stream. Returns once the response headers arrived, at which
    /// point the server-side subscription exists.
    pub async fn connect(url: &str) -> Self {
        let response = reqwest::get(url).await.expect("Failed to open event stream");
        assert!(
            response.status().is_success(),
            "Event stream returned {}",
            response.status()
        );
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(content_type, "text/event-stream");

        Self {
            chunks: Box::pin(response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()))),
            buffer: String::new(),
        }
    }

    /// Next frame, or `None` if the stream ended or nothing arrived in time.
    pub async fn next_frame_within(&mut self, wait: Duration) -> Option<Frame> {
        tokio::time::timeout(wait, self.read_frame()).await.ok().flatten()
    }

    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.next_frame_within(Duration::from_millis(FRAME_TIMEOUT_MS))
            .await
    }

    /// Asserts that no frame arrives during the quiet period.
    pub async fn expect_quiet(&mut self) {
        if let Some(frame) = self
            .next_frame_within(Duration::from_millis(QUIET_PERIOD_MS))
            .await
        {
            panic!("Unexpected frame: {:?}", frame);
        }
    }

    /// `true` once the server has ended the stream.
    pub async fn is_ended(&mut self) -> bool {
        let ended = tokio::time::timeout(Duration::from_millis(FRAME_TIMEOUT_MS), async {
            while let Some(chunk) = self.chunks.next().await {
                if chunk.is_err() {
                    break;
                }
            }
        })
        .await;
        ended.is_ok()
    }

    async fn read_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                // Keep-alive comments carry no event
                if let Some(frame) = parse_frame(&raw) {
                    return Some(frame);
                }
                continue;
            }
            let chunk = self.chunks.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

fn parse_frame(raw: &str) -> Option<Frame> {
    let mut event = String::new();
    let mut data = String::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("event: ") {
            event = value.to_string();
        } else if let Some(value) = line.strip_prefix("data: ") {
            data.push_str(value);
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(Frame {
        event,
        data: serde_json::from_str(&data).expect("Frame data is not JSON"),
    })
}
