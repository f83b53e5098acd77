use crate::domain::{RecordCoordinates, WireRecord};
use crate::nats::MessageAcker;
use anyhow::{Context, Result, anyhow};
use async_nats::{HeaderMap, jetstream};
use chrono::{DateTime, Utc};
use std::fmt;

/// A fetched record together with the handle that settles it.
///
/// The acker is consumed by `ack`/`nak`, so a message settles at most once.
pub struct InboundMessage {
    pub record: WireRecord,
    pub headers: Option<HeaderMap>,
    acker: Box<dyn MessageAcker>,
}

impl InboundMessage {
    pub fn new(record: WireRecord, headers: Option<HeaderMap>, acker: Box<dyn MessageAcker>) -> Self {
        Self {
            record,
            headers,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nak(self) -> Result<()> {
        self.acker.nak().await
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("record", &self.record)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Build a `WireRecord` from the JetStream metadata of a fetched message
pub fn wire_record_from_message(
    message: &jetstream::Message,
    partition: usize,
) -> Result<WireRecord> {
    let info = message
        .info()
        .map_err(|e| anyhow!(e))
        .context("message carries no JetStream metadata")?;

    let produced_at = DateTime::<Utc>::from_timestamp(
        info.published.unix_timestamp(),
        info.published.nanosecond(),
    )
    .context("JetStream publish timestamp out of range")?;

    Ok(WireRecord {
        coordinates: RecordCoordinates {
            subject: message.subject.to_string(),
            partition,
            stream_sequence: info.stream_sequence,
        },
        delivered: u64::try_from(info.delivered).unwrap_or(1),
        produced_at,
        payload: message.payload.clone(),
    })
}
