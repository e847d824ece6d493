use super::task::{PeriodicTask, TriggerSource};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// When a [`Scheduler`] runs its task.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Time between interval-triggered runs.
    pub interval: Duration,
    /// Run once immediately when the scheduler starts.
    pub run_on_start: bool,
}

impl ScheduleSettings {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            run_on_start: false,
        }
    }

    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

/// Handle to a running periodic loop.
///
/// Dropping the handle without calling [`Scheduler::stop`] cancels the loop
/// but does not wait for it.
pub struct Scheduler {
    task_name: &'static str,
    trigger_tx: mpsc::Sender<()>,
    shutdown_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the loop for `task` on the current tokio runtime.
    ///
    /// The loop ends when [`Scheduler::stop`] is called or `parent` is cancelled.
    pub fn spawn(
        task: Arc<dyn PeriodicTask>,
        settings: ScheduleSettings,
        parent: &CancellationToken,
    ) -> Self {
        let task_name = task.name();
        // Capacity 1: triggers arriving while one is pending are coalesced
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let shutdown_token = parent.child_token();

        let handle = tokio::spawn(run_loop(
            task,
            settings,
            trigger_rx,
            shutdown_token.clone(),
        ));

        Self {
            task_name,
            trigger_tx,
            shutdown_token,
            handle: Some(handle),
        }
    }

    /// Request an immediate run outside the normal interval.
    ///
    /// Returns `false` if a trigger was already pending or the loop has ended.
    pub fn trigger(&self) -> bool {
        match self.trigger_tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Trigger for {} already pending", self.task_name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Stop the loop and wait for any run in progress to finish.
    pub async fn stop(mut self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Scheduler loop for {} panicked: {}", self.task_name, e);
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

async fn run_loop(
    task: Arc<dyn PeriodicTask>,
    settings: ScheduleSettings,
    mut trigger_rx: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    let name = task.name();
    let period = settings.interval.max(Duration::from_millis(1));
    info!("Starting scheduler for {} (every {:?})", name, period);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    if settings.run_on_start {
        run_once(task.as_ref(), TriggerSource::Startup, &shutdown).await;
    }

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Scheduler for {} received shutdown signal", name);
                break;
            }
            Some(()) = trigger_rx.recv() => {
                run_once(task.as_ref(), TriggerSource::Manual, &shutdown).await;
            }
            _ = ticker.tick() => {
                run_once(task.as_ref(), TriggerSource::Interval, &shutdown).await;
            }
        }
    }

    info!("Scheduler for {} stopped", name);
}

async fn run_once(task: &dyn PeriodicTask, trigger: TriggerSource, shutdown: &CancellationToken) {
    if shutdown.is_cancelled() {
        return;
    }
    debug!("Running {} (trigger: {})", task.name(), trigger);
    metrics::record_scheduler_run(task.name(), trigger.as_str());
    if let Err(e) = task.run(trigger, shutdown).await {
        warn!("Periodic task {} failed: {:#}", task.name(), e);
    }
}
