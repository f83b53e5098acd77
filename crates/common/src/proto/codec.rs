use crate::domain::{
    AspectPayload, ChangeKind, DEFAULT_ASPECT_CONTENT_TYPE, DecodeError, EncodeError, FailedInput,
    FailureEnvelope, Proposal, ProposalCodec, SystemMetadata, WireRecord,
};
use crate::proto::change_proposal::v1::{
    ChangeKind as ProtoChangeKind, ChangeProposal as ProtoChangeProposal,
    FailedChangeProposal as ProtoFailedChangeProposal, GenericAspect as ProtoGenericAspect,
    SystemMetadata as ProtoSystemMetadata,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use prost::Message;
use prost_types::Timestamp;

/// Protobuf codec for the `change_proposal.v1` schema
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufProposalCodec;

impl ProposalCodec for ProtobufProposalCodec {
    fn decode(&self, record: &WireRecord) -> Result<Proposal, DecodeError> {
        let proto = ProtoChangeProposal::decode(record.payload.clone())?;
        proposal_proto_to_domain(proto)
    }

    fn encode_failure(&self, envelope: &FailureEnvelope) -> Result<Bytes, EncodeError> {
        let proto = failure_envelope_domain_to_proto(envelope)?;

        let mut buf = BytesMut::with_capacity(proto.encoded_len());
        proto.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Convert protobuf ChangeProposal to a validated domain Proposal
pub fn proposal_proto_to_domain(proto: ProtoChangeProposal) -> Result<Proposal, DecodeError> {
    let change_kind = change_kind_proto_to_domain(proto.change_kind)?;

    if proto.entity_urn.is_empty() {
        return Err(DecodeError::MissingField("entity_urn"));
    }
    if proto.entity_type.is_empty() {
        return Err(DecodeError::MissingField("entity_type"));
    }
    if proto.aspect_name.is_empty() {
        return Err(DecodeError::MissingField("aspect_name"));
    }

    let aspect = proto.aspect.map(|aspect| {
        let content_type = if aspect.content_type.is_empty() {
            DEFAULT_ASPECT_CONTENT_TYPE.to_string()
        } else {
            aspect.content_type
        };
        AspectPayload::new(aspect.value, content_type)
    });

    let system_metadata = proto.system_metadata.map(|metadata| SystemMetadata {
        run_id: metadata.run_id,
        last_observed_ms: metadata.last_observed_ms,
        properties: metadata.properties.into_iter().collect(),
    });

    let proposal = Proposal {
        entity_urn: proto.entity_urn,
        entity_type: proto.entity_type,
        aspect_name: proto.aspect_name,
        change_kind,
        aspect,
        system_metadata,
    };
    proposal.validate()?;

    Ok(proposal)
}

/// Convert a domain Proposal to its protobuf form
pub fn proposal_domain_to_proto(proposal: &Proposal) -> ProtoChangeProposal {
    ProtoChangeProposal {
        entity_urn: proposal.entity_urn.clone(),
        entity_type: proposal.entity_type.clone(),
        aspect_name: proposal.aspect_name.clone(),
        change_kind: change_kind_domain_to_proto(proposal.change_kind) as i32,
        aspect: proposal.aspect.as_ref().map(|aspect| ProtoGenericAspect {
            value: aspect.value.clone(),
            content_type: aspect.content_type.clone(),
        }),
        system_metadata: proposal
            .system_metadata
            .as_ref()
            .map(|metadata| ProtoSystemMetadata {
                run_id: metadata.run_id.clone(),
                last_observed_ms: metadata.last_observed_ms,
                properties: metadata
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            }),
    }
}

/// Serialize a proposal the way producers put it on the inbound stream
pub fn encode_proposal(proposal: &Proposal) -> Bytes {
    Bytes::from(proposal_domain_to_proto(proposal).encode_to_vec())
}

/// Convert a domain FailureEnvelope to the dead-letter protobuf record
pub fn failure_envelope_domain_to_proto(
    envelope: &FailureEnvelope,
) -> Result<ProtoFailedChangeProposal, EncodeError> {
    if envelope.error().message.trim().is_empty() {
        return Err(EncodeError::EmptyDescription);
    }

    let (proposal, raw_payload) = match envelope.input() {
        FailedInput::Proposal(proposal) => (Some(proposal_domain_to_proto(proposal)), Bytes::new()),
        FailedInput::Undecodable { raw_payload } => (None, raw_payload.clone()),
    };

    let source = envelope.source();

    Ok(ProtoFailedChangeProposal {
        proposal,
        error: envelope.error().trace.clone(),
        failed_at: Some(datetime_to_timestamp(envelope.failed_at())),
        attempts: envelope.attempts(),
        source_subject: source.subject.clone(),
        source_sequence: source.stream_sequence,
        raw_payload,
        source_partition: source.partition as u32,
    })
}

fn change_kind_proto_to_domain(tag: i32) -> Result<ChangeKind, DecodeError> {
    match ProtoChangeKind::try_from(tag) {
        Ok(ProtoChangeKind::Upsert) => Ok(ChangeKind::Upsert),
        Ok(ProtoChangeKind::Delete) => Ok(ChangeKind::Delete),
        Ok(ProtoChangeKind::Patch) => Ok(ChangeKind::Patch),
        Ok(ProtoChangeKind::Restate) => Ok(ChangeKind::Restate),
        Ok(ProtoChangeKind::Unspecified) => Err(DecodeError::MissingField("change_kind")),
        Err(_) => Err(DecodeError::UnknownChangeKind(tag)),
    }
}

fn change_kind_domain_to_proto(kind: ChangeKind) -> ProtoChangeKind {
    match kind {
        ChangeKind::Upsert => ProtoChangeKind::Upsert,
        ChangeKind::Delete => ProtoChangeKind::Delete,
        ChangeKind::Patch => ProtoChangeKind::Patch,
        ChangeKind::Restate => ProtoChangeKind::Restate,
    }
}

/// Convert chrono DateTime to protobuf Timestamp
fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CodecError, ProposalValidationError, RecordCoordinates};
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("metadata service unavailable: 503 Service Unavailable")]
    struct Unavailable;

    fn record(payload: impl Into<Bytes>) -> WireRecord {
        WireRecord::new(
            RecordCoordinates {
                subject: "MetadataChangeProposal_v1.0".to_string(),
                partition: 0,
                stream_sequence: 11,
            },
            Utc::now(),
            payload,
        )
    }

    fn status_proposal() -> ProtoChangeProposal {
        ProtoChangeProposal {
            entity_urn: "entityA".to_string(),
            entity_type: "dataset".to_string(),
            aspect_name: "status".to_string(),
            change_kind: ProtoChangeKind::Upsert as i32,
            aspect: Some(ProtoGenericAspect {
                value: Bytes::from_static(br#"{"active":true}"#),
                content_type: String::new(),
            }),
            system_metadata: Some(ProtoSystemMetadata {
                run_id: Some("ingest-run-1".to_string()),
                last_observed_ms: Some(1_700_000_000_000),
                properties: [("source".to_string(), "cli".to_string())].into(),
            }),
        }
    }

    #[test]
    fn test_decode_valid_proposal() {
        let codec = ProtobufProposalCodec;
        let proposal = codec
            .decode(&record(status_proposal().encode_to_vec()))
            .unwrap();

        assert_eq!(proposal.entity_urn, "entityA");
        assert_eq!(proposal.change_kind, ChangeKind::Upsert);

        let aspect = proposal.aspect.unwrap();
        assert_eq!(aspect.value, Bytes::from_static(br#"{"active":true}"#));
        assert_eq!(aspect.content_type, DEFAULT_ASPECT_CONTENT_TYPE);

        let metadata = proposal.system_metadata.unwrap();
        assert_eq!(metadata.run_id.as_deref(), Some("ingest-run-1"));
        assert_eq!(metadata.properties.get("source").map(String::as_str), Some("cli"));
    }

    #[test]
    fn test_decode_malformed_bytes() {
        let codec = ProtobufProposalCodec;
        let result = codec.decode(&record(Bytes::from_static(&[0xff, 0xff, 0xff])));
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_missing_field() {
        let mut proto = status_proposal();
        proto.aspect_name = String::new();

        let result = ProtobufProposalCodec.decode(&record(proto.encode_to_vec()));
        assert!(matches!(result, Err(DecodeError::MissingField("aspect_name"))));
    }

    #[test]
    fn test_decode_unknown_change_kind() {
        let mut proto = status_proposal();
        proto.change_kind = 42;

        let result = ProtobufProposalCodec.decode(&record(proto.encode_to_vec()));
        assert!(matches!(result, Err(DecodeError::UnknownChangeKind(42))));
    }

    #[test]
    fn test_decode_unspecified_change_kind() {
        let mut proto = status_proposal();
        proto.change_kind = ProtoChangeKind::Unspecified as i32;

        let result = ProtobufProposalCodec.decode(&record(proto.encode_to_vec()));
        assert!(matches!(result, Err(DecodeError::MissingField("change_kind"))));
    }

    #[test]
    fn test_decode_enforces_proposal_invariants() {
        let mut proto = status_proposal();
        proto.entity_urn = "urn:li:corpuser:jdoe".to_string();

        let result = ProtobufProposalCodec.decode(&record(proto.encode_to_vec()));
        assert!(matches!(
            result,
            Err(DecodeError::Invalid(
                ProposalValidationError::EntityTypeMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_delete_without_aspect_decodes() {
        let mut proto = status_proposal();
        proto.change_kind = ProtoChangeKind::Delete as i32;
        proto.aspect = None;

        let proposal = ProtobufProposalCodec
            .decode(&record(proto.encode_to_vec()))
            .unwrap();
        assert_eq!(proposal.change_kind, ChangeKind::Delete);
        assert!(proposal.aspect.is_none());
    }

    #[test]
    fn test_encode_failure_for_proposal() {
        let source = record(status_proposal().encode_to_vec());
        let proposal = ProtobufProposalCodec.decode(&source).unwrap();
        let envelope = FailureEnvelope::for_proposal(proposal, &Unavailable, 3, &source);

        let bytes = ProtobufProposalCodec.encode_failure(&envelope).unwrap();
        let decoded = ProtoFailedChangeProposal::decode(bytes).unwrap();

        assert_eq!(decoded.proposal.unwrap().entity_urn, "entityA");
        assert_eq!(
            decoded.error,
            "metadata service unavailable: 503 Service Unavailable"
        );
        assert_eq!(decoded.attempts, 3);
        assert_eq!(decoded.source_sequence, 11);
        assert!(decoded.raw_payload.is_empty());
        assert_eq!(
            decoded.failed_at.unwrap().seconds,
            envelope.failed_at().timestamp()
        );
    }

    #[test]
    fn test_encode_failure_for_undecodable_record() {
        let source = record(Bytes::from_static(&[0xff, 0xff, 0xff]));
        let decode_error = ProtobufProposalCodec.decode(&source).unwrap_err();
        let envelope = FailureEnvelope::for_undecodable(&source, &CodecError::from(decode_error));

        let bytes = ProtobufProposalCodec.encode_failure(&envelope).unwrap();
        let decoded = ProtoFailedChangeProposal::decode(bytes).unwrap();

        assert!(decoded.proposal.is_none());
        assert_eq!(decoded.attempts, 0);
        assert_eq!(decoded.raw_payload, Bytes::from_static(&[0xff, 0xff, 0xff]));
        assert!(decoded.error.starts_with("failed to decode inbound record\nCaused by: "));
    }

    #[test]
    fn test_encode_rejects_empty_description() {
        #[derive(Debug, Error)]
        #[error(" ")]
        struct Silent;

        let source = record(status_proposal().encode_to_vec());
        let proposal = ProtobufProposalCodec.decode(&source).unwrap();
        let envelope = FailureEnvelope::for_proposal(proposal, &Silent, 1, &source);

        let result = ProtobufProposalCodec.encode_failure(&envelope);
        assert!(matches!(result, Err(EncodeError::EmptyDescription)));
    }

    #[test]
    fn test_encode_failure_for_empty_payload() {
        let source = record(Bytes::new());
        let decode_error = ProtobufProposalCodec.decode(&source).unwrap_err();
        assert!(matches!(decode_error, DecodeError::MissingField("change_kind")));

        let envelope = FailureEnvelope::for_undecodable(&source, &CodecError::from(decode_error));
        let bytes = ProtobufProposalCodec.encode_failure(&envelope).unwrap();
        let decoded = ProtoFailedChangeProposal::decode(bytes).unwrap();

        assert!(decoded.proposal.is_none());
        assert!(decoded.raw_payload.is_empty());
        assert_eq!(decoded.source_subject, "MetadataChangeProposal_v1.0");
        assert_eq!(decoded.source_sequence, 11);
        assert!(decoded.error.contains("change_kind"));
    }

    #[test]
    fn test_encode_proposal_is_decodable() {
        let source = record(status_proposal().encode_to_vec());
        let proposal = ProtobufProposalCodec.decode(&source).unwrap();

        let reencoded = ProtobufProposalCodec
            .decode(&record(encode_proposal(&proposal)))
            .unwrap();
        assert_eq!(reencoded, proposal);
    }
}
