use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// What caused a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    Startup,
    Interval,
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Startup => "startup",
            TriggerSource::Interval => "interval",
            TriggerSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work driven by a [`Scheduler`](super::Scheduler).
///
/// Runs never overlap: the scheduler awaits each run before it looks at its
/// timer or trigger again. Long runs should check `shutdown` and return early.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Identifier used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn run(&self, trigger: TriggerSource, shutdown: &CancellationToken) -> Result<()>;
}
