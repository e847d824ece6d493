use chrono::{DateTime, Utc};

/// An entity's cached external resource and its fetch bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshableRecord {
    pub id: String,
    /// Origin the fetch target is derived from. Blank means "never fetch".
    pub source_origin: String,
    /// `None` or empty until the first successful fetch.
    pub resource_data: Option<Vec<u8>>,
    pub content_type: String,
    /// Last successful fetch.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Last attempt, successful or not.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl RefreshableRecord {
    pub fn new(id: impl Into<String>, source_origin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_origin: source_origin.into(),
            ..Default::default()
        }
    }

    pub fn has_origin(&self) -> bool {
        !self.source_origin.trim().is_empty()
    }

    pub fn has_resource(&self) -> bool {
        self.resource_data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

/// A resolved binary asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Asset {
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}
