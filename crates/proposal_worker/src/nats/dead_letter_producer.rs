use async_trait::async_trait;
use bytes::Bytes;
use common::{
    DeadLetterPublishError, DeadLetterSink, FailureEnvelope, JetStreamPublisher, PublishRequest,
    TracedPublisher, build_traced_publisher,
};
use std::sync::Arc;
use tower::ServiceExt;
use tracing::{debug, info};

/// Writes encoded failure envelopes to the dead-letter stream.
///
/// The envelope lands on `{stream}.{partition}`, mirroring the partition of
/// the record that failed.
pub struct DeadLetterProducer {
    publisher: TracedPublisher,
    stream: String,
}

impl DeadLetterProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, stream: impl Into<String>) -> Self {
        let stream = stream.into();
        debug!(stream = %stream, "initialized dead-letter producer");

        Self {
            publisher: build_traced_publisher(jetstream, "dead_letter_producer"),
            stream,
        }
    }

    fn subject_for(&self, envelope: &FailureEnvelope) -> String {
        format!("{}.{}", self.stream, envelope.source().partition)
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterProducer {
    async fn publish(
        &self,
        envelope: &FailureEnvelope,
        payload: Bytes,
    ) -> Result<(), DeadLetterPublishError> {
        let source = envelope.source();
        let request = PublishRequest::new(self.subject_for(envelope), payload)
            .with_header("Mcp-Source-Subject", &source.subject)
            .with_header("Mcp-Source-Sequence", &source.stream_sequence.to_string());

        let response = self.publisher.clone().oneshot(request).await?;

        info!(
            subject = %response.subject,
            source = %source,
            attempts = envelope.attempts(),
            "failure envelope dead-lettered"
        );
        Ok(())
    }
}
