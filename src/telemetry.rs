//! Metric names and recording helpers.
//!
//! Metrics go through the `metrics` facade; the embedding process decides
//! which recorder or exporter receives them.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const CACHE_HITS: &str = "secret_manager_cache_hits_total";
pub const CACHE_MISSES: &str = "secret_manager_cache_misses_total";
pub const QUEUE_LENGTH: &str = "bouncer_queue_length";
pub const TIME_IN_QUEUE: &str = "bouncer_time_in_queue_seconds";
pub const HTTP_CLIENT_DURATION: &str = "http_client_request_duration_seconds";

/// Why a cache lookup did not produce a usable entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NotFound,
    Expired,
    IdMismatch,
    ValueMismatch,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::NotFound => "not_found",
            MissReason::Expired => "expired",
            MissReason::IdMismatch => "id_mismatch",
            MissReason::ValueMismatch => "value_mismatch",
        }
    }
}

/// Outcome of waiting for a bouncer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Acquired,
    Cancelled,
}

impl QueueOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOutcome::Acquired => "acquired",
            QueueOutcome::Cancelled => "cancelled",
        }
    }
}

/// Register metric descriptions so exporters show them before first use.
pub fn describe_metrics() {
    describe_counter!(CACHE_HITS, Unit::Count, "Secret cache hits by operation");
    describe_counter!(
        CACHE_MISSES,
        Unit::Count,
        "Secret cache misses by operation and reason"
    );
    describe_gauge!(
        QUEUE_LENGTH,
        Unit::Count,
        "Callers currently queued or running in the bouncer"
    );
    describe_histogram!(
        TIME_IN_QUEUE,
        Unit::Seconds,
        "Time spent waiting for a bouncer lock by outcome"
    );
    describe_histogram!(
        HTTP_CLIENT_DURATION,
        Unit::Seconds,
        "Duration of HTTP requests to the vault"
    );
}

pub fn record_cache_hit(operation: &'static str) {
    counter!(CACHE_HITS, "operation" => operation).increment(1);
}

pub fn record_cache_miss(operation: &'static str, reason: MissReason) {
    counter!(CACHE_MISSES, "operation" => operation, "reason" => reason.as_str()).increment(1);
}

pub fn queue_entered(queue: &str) {
    gauge!(QUEUE_LENGTH, "queue" => queue.to_string()).increment(1.0);
}

pub fn queue_left(queue: &str) {
    gauge!(QUEUE_LENGTH, "queue" => queue.to_string()).decrement(1.0);
}

pub fn record_time_in_queue(queue: &str, outcome: QueueOutcome, seconds: f64) {
    histogram!(TIME_IN_QUEUE, "queue" => queue.to_string(), "outcome" => outcome.as_str())
        .record(seconds);
}

pub fn record_http_request(client: &'static str, method: &'static str, status: &str, seconds: f64) {
    let labels = [
        ("client", client.to_string()),
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    histogram!(HTTP_CLIENT_DURATION, &labels).record(seconds);
}
