use crate::domain::{FailureEnvelope, Proposal, ProposalValidationError, WireRecord};
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed change proposal payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("change proposal is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown change kind tag {0}")]
    UnknownChangeKind(i32),

    #[error("invalid change proposal: {0}")]
    Invalid(#[from] ProposalValidationError),
}

/// Raised only for envelopes that should never have been built
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failure envelope has an empty error description")]
    EmptyDescription,

    #[error("failed to serialize failure envelope: {0}")]
    Buffer(#[from] prost::EncodeError),
}

/// Either direction of a codec failure, as it appears in dead-letter records
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode inbound record")]
    Decode(#[from] DecodeError),

    #[error("failed to encode failure envelope")]
    Encode(#[from] EncodeError),
}

/// Translation between the inbound wire schema and domain types.
///
/// Implementations are pure: no I/O and no shared mutable state.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ProposalCodec: Send + Sync {
    /// Decode an inbound record into a validated proposal
    fn decode(&self, record: &WireRecord) -> Result<Proposal, DecodeError>;

    /// Encode a failure envelope into the dead-letter wire form
    fn encode_failure(&self, envelope: &FailureEnvelope) -> Result<Bytes, EncodeError>;
}
