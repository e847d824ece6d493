//! Resolution of an entity's origin to its icon asset.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::models::Asset;
use crate::config::RefreshSettings;

/// Turns an origin into a binary asset.
///
/// `Ok(None)` means the origin has no asset; errors are transient failures.
/// Called concurrently for different entities.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve_asset(&self, origin: &str) -> Result<Option<Asset>>;
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid origin {0:?}")]
    InvalidOrigin(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("asset exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Build the favicon URL for an origin such as `example.com` or
/// `https://example.com/some/page`.
pub fn icon_url(origin: &str) -> Result<Url, ResolveError> {
    let trimmed = origin.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::InvalidOrigin(origin.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url =
        Url::parse(&with_scheme).map_err(|_| ResolveError::InvalidOrigin(origin.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ResolveError::InvalidOrigin(origin.to_string()));
    }

    url.join("/favicon.ico")
        .map_err(|_| ResolveError::InvalidOrigin(origin.to_string()))
}

/// Content type of an image body: the declared header when it names an
/// image, otherwise whatever the bytes look like.
fn image_content_type(declared: Option<&str>, body: &[u8]) -> Option<String> {
    if let Some(declared) = declared {
        let mime = declared.split(';').next().unwrap_or_default().trim();
        if mime.starts_with("image/") {
            return Some(mime.to_string());
        }
    }
    infer::get(body)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .map(str::to_string)
}

/// Fetches `/favicon.ico` from the origin's host.
pub struct HttpIconResolver {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpIconResolver {
    pub const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_bytes: Self::DEFAULT_MAX_BYTES,
        })
    }

    pub fn from_settings(settings: &RefreshSettings) -> Result<Self> {
        Self::new(settings.fetch_timeout(), &settings.user_agent)
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn fetch(&self, origin: &str) -> Result<Option<Asset>, ResolveError> {
        let url = icon_url(origin)?;
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!("No icon at {} ({})", url, status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(ResolveError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Chunked responses carry no length, so the limit is enforced while reading
        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ResolveError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        if body.is_empty() {
            return Ok(None);
        }

        match image_content_type(declared.as_deref(), &body) {
            Some(content_type) => Ok(Some(Asset::new(content_type, body))),
            None => {
                debug!("Body at {} is not an image", url);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AssetResolver for HttpIconResolver {
    async fn resolve_asset(&self, origin: &str) -> Result<Option<Asset>> {
        self.fetch(origin)
            .await
            .with_context(|| format!("Failed to resolve icon for {}", origin))
    }
}
