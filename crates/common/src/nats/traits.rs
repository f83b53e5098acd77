use crate::nats::InboundMessage;
use anyhow::Result;
use async_nats::{HeaderMap, jetstream};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Creates durable pull consumers on a JetStream stream
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create (or bind to) a durable pull consumer.
    ///
    /// `partition` is stamped on every record the consumer yields.
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
        partition: usize,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// Fetch side of a single pull consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch up to `max_messages`, waiting at most `expires` for the batch to fill
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<InboundMessage>>;
}

/// Settles one fetched message with the server
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageAcker: Send + Sync {
    /// Mark the message as processed; it will not be redelivered
    async fn ack(&self) -> Result<()>;

    /// Hand the message back for prompt redelivery
    async fn nak(&self) -> Result<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Publish and wait for the stream to persist the message
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<()>;
}
