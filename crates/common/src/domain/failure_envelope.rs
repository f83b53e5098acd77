use crate::domain::{Proposal, RecordCoordinates, WireRecord};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;

/// Human-readable account of why a record could not be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDescription {
    /// Top-level error message
    pub message: String,
    /// The message followed by every underlying cause, one per line
    pub trace: String,
}

impl FailureDescription {
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let message = error.to_string();
        let mut trace = message.clone();

        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }

        Self { message, trace }
    }
}

/// What the dead-letter record preserves of the original input
#[derive(Debug, Clone, PartialEq)]
pub enum FailedInput {
    /// The decoded proposal that the metadata service would not accept
    Proposal(Proposal),
    /// Raw bytes of a record that never decoded into a proposal
    Undecodable { raw_payload: Bytes },
}

/// Terminal failure record for one inbound record.
///
/// Built once when processing gives up and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureEnvelope {
    input: FailedInput,
    error: FailureDescription,
    failed_at: DateTime<Utc>,
    attempts: u32,
    source: RecordCoordinates,
}

impl FailureEnvelope {
    /// Envelope for a proposal whose ingestion gave up after `attempts` tries
    pub fn for_proposal(
        proposal: Proposal,
        error: &(dyn StdError + 'static),
        attempts: u32,
        record: &WireRecord,
    ) -> Self {
        Self {
            input: FailedInput::Proposal(proposal),
            error: FailureDescription::from_error(error),
            failed_at: Utc::now(),
            attempts,
            source: record.coordinates.clone(),
        }
    }

    /// Envelope for a record that failed to decode; no ingest attempt was made
    pub fn for_undecodable(record: &WireRecord, error: &(dyn StdError + 'static)) -> Self {
        Self {
            input: FailedInput::Undecodable {
                raw_payload: record.payload.clone(),
            },
            error: FailureDescription::from_error(error),
            failed_at: Utc::now(),
            attempts: 0,
            source: record.coordinates.clone(),
        }
    }

    pub fn input(&self) -> &FailedInput {
        &self.input
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        match &self.input {
            FailedInput::Proposal(proposal) => Some(proposal),
            FailedInput::Undecodable { .. } => None,
        }
    }

    pub fn error(&self) -> &FailureDescription {
        &self.error
    }

    pub fn failed_at(&self) -> DateTime<Utc> {
        self.failed_at
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn source(&self) -> &RecordCoordinates {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AspectPayload, ChangeKind};
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct Refused;

    #[derive(Debug, Error)]
    #[error("metadata service unavailable")]
    struct Unavailable(#[source] Refused);

    fn record() -> WireRecord {
        WireRecord::new(
            RecordCoordinates {
                subject: "MetadataChangeProposal_v1.0".to_string(),
                partition: 0,
                stream_sequence: 7,
            },
            Utc::now(),
            Bytes::from_static(b"\x01\x02"),
        )
    }

    #[test]
    fn test_description_includes_cause_chain() {
        let description = FailureDescription::from_error(&Unavailable(Refused));
        assert_eq!(description.message, "metadata service unavailable");
        assert_eq!(
            description.trace,
            "metadata service unavailable\nCaused by: connection refused"
        );
    }

    #[test]
    fn test_for_proposal() {
        let proposal = Proposal {
            entity_urn: "entityA".to_string(),
            entity_type: "dataset".to_string(),
            aspect_name: "status".to_string(),
            change_kind: ChangeKind::Upsert,
            aspect: Some(AspectPayload::json(r#"{"active":true}"#)),
            system_metadata: None,
        };

        let envelope = FailureEnvelope::for_proposal(proposal.clone(), &Refused, 3, &record());

        assert_eq!(envelope.proposal(), Some(&proposal));
        assert_eq!(envelope.attempts(), 3);
        assert_eq!(envelope.error().message, "connection refused");
        assert_eq!(envelope.source().stream_sequence, 7);
    }

    #[test]
    fn test_for_undecodable_keeps_raw_bytes() {
        let envelope = FailureEnvelope::for_undecodable(&record(), &Refused);

        assert_eq!(envelope.attempts(), 0);
        assert!(envelope.proposal().is_none());
        assert_eq!(
            envelope.input(),
            &FailedInput::Undecodable {
                raw_payload: Bytes::from_static(b"\x01\x02")
            }
        );
    }
}
