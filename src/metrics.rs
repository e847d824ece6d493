use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all refresh-relay metrics
const PREFIX: &str = "refresh_relay";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Fetch pipeline
    pub static ref FETCH_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_fetch_total"), "Resource fetch attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create fetch_total metric");

    pub static ref FETCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_fetch_duration_seconds"),
            "Duration of a single resource fetch, resolver plus persistence"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0])
    ).expect("Failed to create fetch_duration_seconds metric");

    pub static ref FETCHES_IN_FLIGHT: Gauge = Gauge::new(
        format!("{PREFIX}_fetches_in_flight"),
        "Number of fetches currently in flight"
    ).expect("Failed to create fetches_in_flight metric");

    // Fan-out
    pub static ref BROADCAST_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_broadcast_events_total"), "Per-subscriber event deliveries"),
        &["channel", "result"]
    ).expect("Failed to create broadcast_events_total metric");

    pub static ref SUBSCRIBERS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_subscribers"), "Live subscribers per channel"),
        &["channel"]
    ).expect("Failed to create subscribers metric");

    // Scheduler
    pub static ref SCHEDULER_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_scheduler_runs_total"), "Periodic task runs by trigger"),
        &["task", "trigger"]
    ).expect("Failed to create scheduler_runs_total metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    // Ignore errors if already registered (tests call this repeatedly)
    let _ = REGISTRY.register(Box::new(FETCH_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FETCH_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(FETCHES_IN_FLIGHT.clone()));
    let _ = REGISTRY.register(Box::new(BROADCAST_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SUBSCRIBERS.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULER_RUNS_TOTAL.clone()));

    tracing::info!("Metrics system initialized");
}

pub fn record_fetch(outcome: &str, duration: Duration) {
    FETCH_TOTAL.with_label_values(&[outcome]).inc();
    FETCH_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_fetches_in_flight(count: usize) {
    FETCHES_IN_FLIGHT.set(count as f64);
}

pub fn record_broadcast(channel: &str, delivered: usize, dropped: usize) {
    if delivered > 0 {
        BROADCAST_EVENTS_TOTAL
            .with_label_values(&[channel, "delivered"])
            .inc_by(delivered as f64);
    }
    if dropped > 0 {
        BROADCAST_EVENTS_TOTAL
            .with_label_values(&[channel, "dropped"])
            .inc_by(dropped as f64);
    }
}

pub fn set_subscribers(channel: &str, count: usize) {
    SUBSCRIBERS.with_label_values(&[channel]).set(count as f64);
}

pub fn record_scheduler_run(task: &str, trigger: &str) {
    SCHEDULER_RUNS_TOTAL.with_label_values(&[task, trigger]).inc();
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
