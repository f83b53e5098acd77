use crate::nats::traits::{JetStreamConsumer, JetStreamPublisher, MessageAcker, PullConsumer};
use crate::nats::{InboundMessage, wire_record_from_message};
use anyhow::{Context, Result, anyhow};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Make sure `stream_name` exists and captures `{stream_name}.*`
    pub async fn ensure_stream(&self, stream_name: &str, description: &str) -> Result<()> {
        match self.jetstream.get_stream(stream_name).await {
            Ok(_) => {
                debug!(stream = %stream_name, "stream already exists");
            }
            Err(_) => {
                let config = StreamConfig {
                    name: stream_name.to_string(),
                    subjects: vec![format!("{}.*", stream_name)],
                    description: Some(description.to_string()),
                    ..Default::default()
                };

                self.jetstream
                    .create_stream(config)
                    .await
                    .with_context(|| format!("failed to create stream {}", stream_name))?;
                info!(stream = %stream_name, "created stream");
            }
        }

        Ok(())
    }

    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(self.jetstream.clone()))
    }

    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    /// Flush pending publishes before the connection is dropped
    pub async fn close(self) {
        info!("closing NATS connection");
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "failed to flush NATS connection on close");
        }
    }
}

pub struct NatsJetStreamConsumer {
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
        partition: usize,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .context("failed to create consumer")?;

        Ok(Box::new(NatsPullConsumer {
            consumer,
            partition,
        }))
    }
}

pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
    partition: usize,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<InboundMessage>> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("failed to fetch messages")?;

        let mut received = Vec::with_capacity(max_messages);
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(message) => received.push(message),
                Err(e) => error!(error = %e, "error receiving message"),
            }
        }

        let (readable, held_back) =
            split_at_unreadable(received, |message| wire_record_from_message(message, self.partition));

        if let Some(first) = held_back.first() {
            warn!(
                subject = %first.subject,
                held_back = held_back.len(),
                "message carries unreadable metadata, returning it and the rest of the batch"
            );
        }
        for message in held_back {
            if let Err(e) = message.ack_with(jetstream::AckKind::Nak(None)).await {
                error!(subject = %message.subject, error = %e, "failed to nak held-back message");
            }
        }

        let batch = readable
            .into_iter()
            .map(|(message, record)| {
                let headers = message.headers.clone();
                InboundMessage::new(record, headers, Box::new(JetStreamAcker { message }))
            })
            .collect();

        Ok(batch)
    }
}

/// Split a fetched batch at the first message `read` rejects.
///
/// Everything from that message on is returned unread so it can be handed back
/// as a block; settling later messages first would reorder the partition.
fn split_at_unreadable<M, R>(
    messages: Vec<M>,
    mut read: impl FnMut(&M) -> Result<R>,
) -> (Vec<(M, R)>, Vec<M>) {
    let mut readable = Vec::with_capacity(messages.len());
    let mut rest = messages.into_iter();

    while let Some(message) = rest.next() {
        match read(&message) {
            Ok(record) => readable.push((message, record)),
            Err(e) => {
                debug!(error = %format!("{e:#}"), "stopping batch at unreadable message");
                let mut held_back = vec![message];
                held_back.extend(rest);
                return (readable, held_back);
            }
        }
    }

    (readable, Vec::new())
}

struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl MessageAcker for JetStreamAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| anyhow!(e))
            .context("failed to ack message")
    }

    async fn nak(&self) -> Result<()> {
        self.message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| anyhow!(e))
            .context("failed to nak message")
    }
}

pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    #[instrument(skip(self, headers, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<()> {
        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("failed to publish message to JetStream")?;

        ack.await
            .context("failed to receive JetStream acknowledgment")?;
        Ok(())
    }
}
