//! Background refresh of entity resources.
//!
//! At most one fetch runs per entity ID. Fetches come from explicit
//! [`RefreshCoordinator::schedule_fetch`] calls and from a periodic stale
//! scan. Every completed refresh is persisted, then broadcast as a
//! [`RefreshEvent`].

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::error::RefreshError;
use super::policy::{RefreshPolicy, RefreshState};
use super::repository::EntityRepository;
use super::resolver::AssetResolver;
use super::RefreshableRecord;
use crate::broadcast::{EventBroadcaster, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::config::RefreshSettings;
use crate::events::RefreshEvent;
use crate::metrics;
use crate::scheduler::{PeriodicTask, ScheduleSettings, Scheduler, TriggerSource};

const EVENT_CHANNEL: &str = "refresh";
const SCAN_TASK_NAME: &str = "stale_resource_scan";

enum Lifecycle {
    Idle {
        /// Fetches of the most recent run, closed. A stop racing another stop
        /// waits on it.
        last_run: TaskTracker,
    },
    Running {
        /// Cancelled after stop has drained; aborts resolver calls when the
        /// parent is cancelled first.
        root: CancellationToken,
        /// Fetches accepted during this run only.
        tasks: TaskTracker,
        scheduler: Scheduler,
        runtime: Handle,
    },
}

impl Lifecycle {
    fn idle() -> Self {
        let last_run = TaskTracker::new();
        last_run.close();
        Lifecycle::Idle { last_run }
    }

    fn tasks(&self) -> &TaskTracker {
        match self {
            Lifecycle::Idle { last_run } => last_run,
            Lifecycle::Running { tasks, .. } => tasks,
        }
    }
}

/// How a fetch that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOutcome {
    Refreshed,
    /// The resolver had nothing for this origin.
    Empty,
    /// The record changed since it was scheduled and is no longer eligible.
    Skipped,
}

impl FetchOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Refreshed => "success",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Skipped => "skipped",
        }
    }
}

struct Inner {
    resolver: Arc<dyn AssetResolver>,
    repository: Arc<dyn EntityRepository>,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
    policy: RefreshPolicy,
    events: EventBroadcaster<RefreshEvent>,
    in_flight: Mutex<HashSet<String>>,
    fetch_permits: Semaphore,
    lifecycle: Mutex<Lifecycle>,
}

/// Removes an entity from the in-flight set when the fetch ends, however it ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight();
        in_flight.remove(&self.id);
        metrics::set_fetches_in_flight(in_flight.len());
    }
}

/// Fetches, persists and announces refreshed entity resources.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        resolver: Arc<dyn AssetResolver>,
        repository: Arc<dyn EntityRepository>,
        settings: RefreshSettings,
    ) -> Self {
        Self::with_clock(resolver, repository, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        resolver: Arc<dyn AssetResolver>,
        repository: Arc<dyn EntityRepository>,
        settings: RefreshSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = RefreshPolicy::from(&settings);
        let events = EventBroadcaster::with_capacity(EVENT_CHANNEL, settings.subscriber_buffer);
        let fetch_permits = Semaphore::new(settings.max_concurrent_fetches.max(1));

        Self {
            inner: Arc::new(Inner {
                resolver,
                repository,
                clock,
                settings,
                policy,
                events,
                in_flight: Mutex::new(HashSet::new()),
                fetch_permits,
                lifecycle: Mutex::new(Lifecycle::idle()),
            }),
        }
    }

    /// Begin the periodic stale scan and accept fetch requests.
    ///
    /// No-op when already running. The coordinator also winds down if
    /// `parent` is cancelled, although [`RefreshCoordinator::stop`] is still
    /// needed to wait for outstanding fetches.
    pub fn start(&self, parent: &CancellationToken) -> Result<()> {
        let runtime = Handle::try_current()
            .map_err(|e| anyhow::anyhow!("Refresh coordinator needs a tokio runtime: {}", e))?;

        let mut lifecycle = self.inner.lifecycle();
        if matches!(*lifecycle, Lifecycle::Running { .. }) {
            debug!("Refresh coordinator already running");
            return Ok(());
        }

        let root = parent.child_token();
        let tasks = TaskTracker::new();

        let task = Arc::new(StaleScan {
            inner: Arc::downgrade(&self.inner),
        });
        let schedule = ScheduleSettings::every(self.inner.settings.scan_interval())
            .run_on_start(self.inner.settings.scan_on_start);
        let scheduler = Scheduler::spawn(task, schedule, &root);

        *lifecycle = Lifecycle::Running {
            root,
            tasks,
            scheduler,
            runtime,
        };
        info!(
            "Refresh coordinator started (scan every {}s, fresh for {}s, retry after {}s)",
            self.inner.settings.scan_interval_secs,
            self.inner.settings.success_refresh_interval_secs,
            self.inner.settings.failure_retry_interval_secs
        );
        Ok(())
    }

    /// Stop the periodic scan and wait for every in-flight fetch to finish.
    ///
    /// Every fetch accepted before this call runs to completion, including
    /// those still waiting for a concurrency permit, and its result is
    /// persisted before this returns. Each resolver call is bounded by the
    /// fetch timeout; cancelling the parent token aborts them.
    pub async fn stop(&self) {
        let (previous, tasks) = {
            let mut lifecycle = self.inner.lifecycle();
            let tasks = lifecycle.tasks().clone();
            tasks.close();
            let last_run = tasks.clone();
            (
                std::mem::replace(&mut *lifecycle, Lifecycle::Idle { last_run }),
                tasks,
            )
        };

        let Lifecycle::Running { root, scheduler, .. } = previous else {
            // Another stop may still be draining
            tasks.wait().await;
            return;
        };

        info!("Stopping refresh coordinator");
        scheduler.stop().await;

        let outstanding = tasks.len();
        if outstanding > 0 {
            info!("Waiting for {} in-flight fetch(es) to finish", outstanding);
        }
        tasks.wait().await;
        root.cancel();
        info!("Refresh coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lifecycle(), Lifecycle::Running { .. })
    }

    /// Fetch `record`'s resource in the background if it is eligible.
    ///
    /// Returns `true` when a fetch was started. Never blocks on the fetch
    /// itself. No-op when not running, when the origin is blank, when the
    /// record is fresh or backed off, or when a fetch for the same ID is
    /// already in flight.
    pub fn schedule_fetch(&self, record: &RefreshableRecord) -> bool {
        self.inner.schedule_fetch(record)
    }

    /// Load the record with `id` and schedule it. Unknown IDs are ignored.
    pub fn schedule_fetch_by_id(&self, id: &str) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.inner.repository.load_by_id(id) {
            Ok(Some(record)) => self.schedule_fetch(&record),
            Ok(None) => {
                debug!("Not scheduling unknown entity {}", id);
                false
            }
            Err(e) => {
                warn!("Failed to load entity {} for refresh: {:#}", id, e);
                false
            }
        }
    }

    /// Scan for stale entities now and schedule each one.
    ///
    /// Returns the number of fetches started.
    pub fn refresh_stale(&self) -> usize {
        self.inner.refresh_stale()
    }

    /// Ask the periodic scan to run now instead of waiting for its interval.
    ///
    /// Returns `false` if not running or a scan request is already pending.
    pub fn trigger_scheduled_refresh(&self) -> bool {
        match &*self.inner.lifecycle() {
            Lifecycle::Running { scheduler, .. } => scheduler.trigger(),
            Lifecycle::Idle { .. } => false,
        }
    }

    /// Subscribe to refresh completions. `None` once events are closed.
    pub fn subscribe(&self) -> Option<Subscription<RefreshEvent>> {
        self.inner.events.subscribe()
    }

    /// Close the refresh event channel, ending every subscription.
    pub fn close_events(&self) {
        self.inner.events.close();
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.inner.in_flight().contains(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight().len()
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_fetch(self: &Arc<Self>, record: &RefreshableRecord) -> bool {
        // Held until the fetch is spawned so a concurrent stop cannot miss it
        let lifecycle = self.lifecycle();
        let Lifecycle::Running {
            root,
            tasks,
            runtime,
            ..
        } = &*lifecycle
        else {
            debug!("Refresh coordinator not running, ignoring {}", record.id);
            return false;
        };

        match self.policy.state(record, self.clock.now()) {
            RefreshState::Eligible => {}
            state => {
                debug!("Not fetching {}: {:?}", record.id, state);
                return false;
            }
        }

        {
            let mut in_flight = self.in_flight();
            if !in_flight.insert(record.id.clone()) {
                debug!("Fetch for {} already in flight", record.id);
                return false;
            }
            metrics::set_fetches_in_flight(in_flight.len());
        }

        let guard = InFlightGuard {
            inner: Arc::clone(self),
            id: record.id.clone(),
        };
        let inner = Arc::clone(self);
        let id = record.id.clone();
        let root = root.clone();

        tasks.spawn_on(
            async move {
                let _guard = guard;
                inner.fetch(&id, &root).await;
            },
            runtime,
        );
        true
    }

    fn refresh_stale(self: &Arc<Self>) -> usize {
        if !matches!(*self.lifecycle(), Lifecycle::Running { .. }) {
            return 0;
        }

        let stale = match self.repository.scan_stale(
            self.policy.success_refresh_interval,
            self.policy.failure_retry_interval,
            self.clock.now(),
        ) {
            Ok(stale) => stale,
            Err(e) => {
                warn!("Stale resource scan failed: {:#}", e);
                return 0;
            }
        };

        let found = stale.len();
        let started = stale
            .iter()
            .filter(|record| self.schedule_fetch(record))
            .count();
        if found > 0 {
            info!("Stale scan found {} entities, started {} fetches", found, started);
        }
        started
    }

    async fn fetch(&self, id: &str, root: &CancellationToken) {
        let started = Instant::now();
        match self.run_fetch(id, root).await {
            Ok(outcome) => {
                debug!("Fetch for {} finished: {}", id, outcome.as_str());
                metrics::record_fetch(outcome.as_str(), started.elapsed());
            }
            Err(RefreshError::Cancelled) => {
                debug!("Fetch for {} cancelled", id);
                metrics::record_fetch(RefreshError::Cancelled.outcome(), started.elapsed());
            }
            Err(e) => {
                warn!("Fetch for {} failed: {}", id, e);
                metrics::record_fetch(e.outcome(), started.elapsed());
            }
        }
    }

    async fn run_fetch(
        &self,
        id: &str,
        root: &CancellationToken,
    ) -> Result<FetchOutcome, RefreshError> {
        let _permit = tokio::select! {
            biased;
            _ = root.cancelled() => return Err(RefreshError::Cancelled),
            permit = self.fetch_permits.acquire() => {
                permit.map_err(|_| RefreshError::Cancelled)?
            }
        };

        // Re-read so a fetch scheduled from an outdated snapshot is not repeated
        let now = self.clock.now();
        let Some(record) = self
            .repository
            .load_by_id(id)
            .map_err(RefreshError::Repository)?
        else {
            return Ok(FetchOutcome::Skipped);
        };
        if !self.policy.is_eligible(&record, now) {
            return Ok(FetchOutcome::Skipped);
        }

        if let Err(e) = self.repository.update_attempt(id, now) {
            warn!("Failed to record fetch attempt for {}: {:#}", id, e);
        }

        let timeout = self.settings.fetch_timeout();
        let resolved = tokio::select! {
            biased;
            _ = root.cancelled() => return Err(RefreshError::Cancelled),
            result = tokio::time::timeout(
                timeout,
                self.resolver.resolve_asset(&record.source_origin),
            ) => result,
        };

        let asset = match resolved {
            Err(_) => return Err(RefreshError::Timeout(timeout)),
            Ok(Err(e)) => return Err(RefreshError::Resolve(e)),
            Ok(Ok(None)) => return Ok(FetchOutcome::Empty),
            Ok(Ok(Some(asset))) if asset.data.is_empty() => return Ok(FetchOutcome::Empty),
            Ok(Ok(Some(asset))) => asset,
        };

        let fetched_at = self.clock.now();
        self.repository
            .update_resource(id, &asset.data, &asset.content_type, fetched_at)
            .map_err(RefreshError::Repository)?;

        let outcome = self.events.broadcast(RefreshEvent {
            entity_id: id.to_string(),
            public_resource_reference: self.public_reference(id, fetched_at.timestamp()),
            updated_at: fetched_at,
        });
        debug!(
            "Refreshed {} ({} bytes, {}), notified {} subscriber(s)",
            id,
            asset.data.len(),
            asset.content_type,
            outcome.delivered
        );

        Ok(FetchOutcome::Refreshed)
    }

    fn public_reference(&self, id: &str, version: i64) -> String {
        format!(
            "{}/{}?v={}",
            self.settings.public_base_path.trim_end_matches('/'),
            id,
            version
        )
    }
}

/// The periodic scan. Holds a weak reference so a dropped coordinator is not
/// kept alive by its own scheduler.
struct StaleScan {
    inner: Weak<Inner>,
}

#[async_trait]
impl PeriodicTask for StaleScan {
    fn name(&self) -> &'static str {
        SCAN_TASK_NAME
    }

    async fn run(&self, _trigger: TriggerSource, _shutdown: &CancellationToken) -> Result<()> {
        if let Some(inner) = self.inner.upgrade() {
            inner.refresh_stale();
        }
        Ok(())
    }
}
