use std::time::Duration;
use thiserror::Error;

/// Why a single fetch did not produce a refreshed resource.
///
/// Never returned to callers of the coordinator; used to classify logs and
/// metrics.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("resolver error: {0:#}")]
    Resolve(anyhow::Error),

    #[error("repository error: {0:#}")]
    Repository(anyhow::Error),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch cancelled")]
    Cancelled,
}

impl RefreshError {
    /// Metric label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            RefreshError::Resolve(_) | RefreshError::Repository(_) => "error",
            RefreshError::Timeout(_) => "timeout",
            RefreshError::Cancelled => "cancelled",
        }
    }
}
