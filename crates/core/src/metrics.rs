//! Metrics definitions for the gateway.
//!
//! This module defines all metrics used throughout the gateway.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

use crate::models::Topic;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "hub_events_published_total",
        "Total number of events published to the hub"
    );
    describe_counter!(
        "hub_events_dropped_total",
        "Total number of per-subscriber deliveries dropped because the queue was full"
    );
    describe_counter!("sessions_opened_total", "Total number of subscription sessions opened");
    describe_counter!("sessions_closed_total", "Total number of subscription sessions closed");
    describe_gauge!("sessions_active", "Number of currently active subscription sessions");
    describe_counter!("ticks_total", "Total number of ticks fired by the tick source");
    describe_counter!("queries_total", "Total number of resolved queries");
    describe_counter!("query_errors_total", "Total number of failed queries");
    describe_histogram!(
        "query_duration_seconds",
        "Time taken to resolve a query in seconds"
    );
}

/// Record a publish and the number of deliveries it dropped.
pub fn record_publish(topic: Topic, dropped: usize) {
    counter!("hub_events_published_total", "topic" => topic.as_str()).increment(1);
    if dropped > 0 {
        counter!("hub_events_dropped_total", "topic" => topic.as_str()).increment(dropped as u64);
    }
}

/// Record a session reaching `Active`.
pub fn record_session_opened() {
    counter!("sessions_opened_total").increment(1);
    gauge!("sessions_active").increment(1.0);
}

/// Record an active session closing.
pub fn record_session_closed() {
    counter!("sessions_closed_total").increment(1);
    gauge!("sessions_active").decrement(1.0);
}

pub fn record_tick() {
    counter!("ticks_total").increment(1);
}

/// Record a query outcome.
///
/// # Arguments
/// * `operation` - The GraphQL operation name
/// * `error_code` - The error code if the query failed
pub fn record_query(operation: &'static str, error_code: Option<&'static str>) {
    counter!("queries_total", "operation" => operation).increment(1);
    if let Some(code) = error_code {
        counter!("query_errors_total", "operation" => operation, "code" => code).increment(1);
    }
}

/// A timer that records query duration when dropped.
pub struct QueryTimer {
    operation: &'static str,
    start: Instant,
}

impl QueryTimer {
    /// Start a new timer for `operation`.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!("query_duration_seconds", "operation" => self.operation).record(duration);
    }
}
