use crate::domain::WireRecord;
use async_nats::HeaderMap;
use tokio_util::sync::CancellationToken;

/// One inbound record handed to the consume service stack.
///
/// Owns everything the stack needs, so middleware can move it freely.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub record: WireRecord,
    /// Optional headers (used for trace context propagation)
    pub headers: Option<HeaderMap>,
    /// Cancelled when the process is shutting down
    pub shutdown: CancellationToken,
}

impl ConsumeRequest {
    pub fn new(
        record: WireRecord,
        headers: Option<HeaderMap>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            record,
            headers,
            shutdown,
        }
    }

    pub fn subject(&self) -> &str {
        &self.record.coordinates.subject
    }
}

/// How the consumer settles the record once the stack returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    /// Processing reached a terminal outcome; never redeliver
    Ack,
    /// Processing did not finish; redeliver
    Nak(Option<String>),
}

impl ConsumeResponse {
    pub fn nak(reason: impl Into<String>) -> Self {
        Self::Nak(Some(reason.into()))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nak(_) => "nak",
        }
    }
}
