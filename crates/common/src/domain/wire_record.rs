use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Position of a record in the durable log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCoordinates {
    pub subject: String,
    pub partition: usize,
    pub stream_sequence: u64,
}

impl fmt::Display for RecordCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]#{}",
            self.subject, self.partition, self.stream_sequence
        )
    }
}

/// A record pulled from the inbound log.
///
/// Owned by the queue client; consumers only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    pub coordinates: RecordCoordinates,
    /// Number of times the log has delivered this record, including this one
    pub delivered: u64,
    pub produced_at: DateTime<Utc>,
    pub payload: Bytes,
}

impl WireRecord {
    pub fn new(
        coordinates: RecordCoordinates,
        produced_at: DateTime<Utc>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            coordinates,
            delivered: 1,
            produced_at,
            payload: payload.into(),
        }
    }

    /// Time between production and `now`, clamped at zero for producer clock skew
    pub fn lag_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.produced_at).to_std().unwrap_or(Duration::ZERO)
    }
}
