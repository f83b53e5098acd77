use crate::domain::{DeadLetterPublishError, FailureEnvelope, IngestError, Proposal};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Credentials the consumer presents to the metadata service
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub actor: String,
    pub client_id: String,
    client_secret: String,
}

impl Identity {
    pub fn new(
        actor: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Value for the `Authorization` header of system-to-system calls
    pub fn authorization_header(&self) -> String {
        format!("Basic {}:{}", self.client_id, self.client_secret)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("actor", &self.actor)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Metadata service that durably applies proposals.
///
/// Implementations must be idempotent for identical proposal content: the
/// consumer re-ingests the same proposal on retry and on redelivery.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProposalSink: Send + Sync {
    /// Apply a single proposal on behalf of `identity`
    async fn ingest(&self, proposal: &Proposal, identity: &Identity) -> Result<(), IngestError>;
}

/// Durable log receiving records the consumer gave up on
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Publish an already-encoded failure envelope.
    ///
    /// # Arguments
    /// * `envelope` - The envelope, used for routing and logging
    /// * `payload` - Wire form produced by the codec
    async fn publish(
        &self,
        envelope: &FailureEnvelope,
        payload: Bytes,
    ) -> Result<(), DeadLetterPublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header() {
        let identity = Identity::new("urn:li:corpuser:__datahub_system", "__datahub_system", "s3cret");
        assert_eq!(identity.authorization_header(), "Basic __datahub_system:s3cret");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let identity = Identity::new("urn:li:corpuser:system", "system", "s3cret");
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
