//! Process-wide ingestion counters and the consumer lag histogram.
//!
//! One `IngestionMetrics` is created at startup and shared by every partition
//! consumer. Every update is an atomic increment and is mirrored into the
//! `metrics` facade so the Prometheus exporter can scrape it.

use metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

pub const LAG_METRIC: &str = "mcp_consumer_kafka_lag_ms";
pub const FAILED_METRIC: &str = "mcp_consumer_failed_total";
pub const RECEIVED_METRIC: &str = "mcp_consumer_received_total";
pub const INGESTED_METRIC: &str = "mcp_consumer_ingested_total";
pub const ATTEMPTS_METRIC: &str = "mcp_consumer_ingest_attempts_total";
pub const RETRIES_METRIC: &str = "mcp_consumer_retries_total";
pub const DEAD_LETTER_PUBLISH_FAILED_METRIC: &str = "mcp_consumer_dead_letter_publish_failed_total";
pub const ENCODE_ANOMALY_METRIC: &str = "mcp_consumer_encode_anomalies_total";

/// Upper bounds (inclusive, in milliseconds) of the lag histogram buckets
pub const LAG_BUCKETS_MS: [u64; 14] = [
    5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000, 300_000,
];

#[derive(Debug, Default)]
pub struct LagHistogram {
    /// One slot per bucket plus the overflow slot
    buckets: [AtomicU64; LAG_BUCKETS_MS.len() + 1],
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl LagHistogram {
    pub fn record(&self, lag: Duration) {
        let lag_ms = u64::try_from(lag.as_millis()).unwrap_or(u64::MAX);
        let slot = LAG_BUCKETS_MS
            .iter()
            .position(|bound| lag_ms <= *bound)
            .unwrap_or(LAG_BUCKETS_MS.len());

        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(lag_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LagSnapshot {
        LagSnapshot {
            buckets: std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed)),
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagSnapshot {
    /// Non-cumulative counts; the last entry counts lags above every bound
    pub buckets: [u64; LAG_BUCKETS_MS.len() + 1],
    pub sum_ms: u64,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct IngestionMetrics {
    received: AtomicU64,
    ingested: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letter_publish_failures: AtomicU64,
    encode_anomalies: AtomicU64,
    lag: LagHistogram,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record was pulled; `lag` is now minus its produce timestamp
    pub fn record_received(&self, lag: Duration) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.lag.record(lag);

        trace!(lag_ms = lag.as_millis() as u64, "record received");
        counter!(RECEIVED_METRIC).increment(1);
        histogram!(LAG_METRIC).record(lag.as_secs_f64() * 1_000.0);
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        counter!(ATTEMPTS_METRIC).increment(1);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        counter!(RETRIES_METRIC).increment(1);
    }

    pub fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
        counter!(INGESTED_METRIC).increment(1);
    }

    /// The failure counter: bumped once per record that gave up
    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
        counter!(FAILED_METRIC).increment(1);
    }

    pub fn record_dead_letter_publish_failure(&self) {
        self.dead_letter_publish_failures
            .fetch_add(1, Ordering::Relaxed);
        counter!(DEAD_LETTER_PUBLISH_FAILED_METRIC).increment(1);
    }

    pub fn record_encode_anomaly(&self) {
        self.encode_anomalies.fetch_add(1, Ordering::Relaxed);
        counter!(ENCODE_ANOMALY_METRIC).increment(1);
    }

    /// Point-in-time copy. Fields are read one by one, not as a single transaction.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            ingested: self.ingested.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dead_letter_publish_failures: self.dead_letter_publish_failures.load(Ordering::Relaxed),
            encode_anomalies: self.encode_anomalies.load(Ordering::Relaxed),
            lag: self.lag.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub ingested: u64,
    pub attempts: u64,
    pub retries: u64,
    pub dead_lettered: u64,
    pub dead_letter_publish_failures: u64,
    pub encode_anomalies: u64,
    pub lag: LagSnapshot,
}
