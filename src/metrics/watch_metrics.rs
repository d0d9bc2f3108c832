//! Watch metrics tracking using OpenTelemetry.

use crate::pubsub::EventKind;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Metrics collector for the change detector and notification fan-out.
///
/// # Examples
///
/// ```rust,no_run
/// use confwatch::metrics::WatchMetrics;
/// use opentelemetry::global;
///
/// let metrics = WatchMetrics::new(global::meter("confwatch"));
///
/// let timer = metrics.start_routing();
/// // ... route a filesystem event ...
/// metrics.record_routing_success(timer);
/// ```
#[derive(Clone)]
pub struct WatchMetrics {
    events_routed: Counter<u64>,
    routing_failures: Counter<u64>,
    routing_duration: Histogram<f64>,
    events_published: Counter<u64>,
    notifications_delivered: Counter<u64>,
    active_subscriptions: Gauge<i64>,
    active: Arc<AtomicI64>,
    content_age_seconds: Gauge<i64>,
    last_change: Arc<parking_lot::Mutex<Instant>>,
}

impl WatchMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let events_routed = meter
            .u64_counter("confwatch.router.events")
            .with_description("Total number of filesystem events routed")
            .build();

        let routing_failures = meter
            .u64_counter("confwatch.router.failures")
            .with_description("Number of filesystem events whose handling failed")
            .build();

        let routing_duration = meter
            .f64_histogram("confwatch.router.duration")
            .with_description("Duration of filesystem event handling in seconds")
            .with_unit("s")
            .build();

        let events_published = meter
            .u64_counter("confwatch.bus.published")
            .with_description("Number of change events published, by kind")
            .build();

        let notifications_delivered = meter
            .u64_counter("confwatch.bus.delivered")
            .with_description("Number of events queued to subscribers")
            .build();

        let active_subscriptions = meter
            .i64_gauge("confwatch.subscriptions.active")
            .with_description("Number of open watch streams across all topics")
            .build();

        let content_age_seconds = meter
            .i64_gauge("confwatch.content.age")
            .with_description("Time since the last content change in seconds")
            .with_unit("s")
            .build();

        Self {
            events_routed,
            routing_failures,
            routing_duration,
            events_published,
            notifications_delivered,
            active_subscriptions,
            active: Arc::new(AtomicI64::new(0)),
            content_age_seconds,
            last_change: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start timing the handling of one filesystem event.
    pub fn start_routing(&self) -> Instant {
        self.events_routed.add(1, &[]);
        Instant::now()
    }

    /// Record that an event was handled.
    pub fn record_routing_success(&self, start: Instant) {
        self.routing_duration
            .record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record that handling an event failed.
    pub fn record_routing_failure(&self, start: Instant) {
        self.routing_failures.add(1, &[]);
        self.routing_duration
            .record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a published event and how many subscribers accepted it.
    pub fn record_published(&self, kind: EventKind, delivered: usize) {
        self.events_published
            .add(1, &[KeyValue::new("kind", kind.as_str())]);
        self.notifications_delivered.add(delivered as u64, &[]);
        *self.last_change.lock() = Instant::now();
    }

    /// Count a newly opened watch stream.
    pub fn subscription_opened(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.active_subscriptions.record(active, &[]);
    }

    /// Count a watch stream whose subscription was released.
    pub fn subscription_closed(&self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        self.active_subscriptions.record(active, &[]);
    }

    /// Watch streams currently open, as last recorded on the gauge.
    pub fn active_subscriptions(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Update the content age metric.
    ///
    /// Called on every walker tick.
    pub fn update_content_age(&self) {
        let age_secs = self.last_change.lock().elapsed().as_secs() as i64;
        self.content_age_seconds.record(age_secs, &[]);
    }
}
