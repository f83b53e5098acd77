use crate::nats::{ConsumeRequest, ConsumeResponse, InboundMessage, JetStreamConsumer, PullConsumer};
use anyhow::{Context, Result};
use async_nats::jetstream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

/// Pause after a failed fetch before asking the server again
const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Where a consumer reads from and how much it fetches at a time
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub stream_name: String,
    /// Durable consumer name, shared by every replica of the consumer group
    pub consumer_name: String,
    pub filter_subject: String,
    pub partition: usize,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// Must outlast the slowest batch, or fetched records are redelivered while still queued
    pub ack_wait: Duration,
}

/// Pulls one partition and drives each record through a Tower service.
///
/// Records are processed strictly one after another: the next record is not
/// handed to the service until the previous one has been settled.
pub struct TowerConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    settings: ConsumerSettings,
    service: S,
}

impl<S> TowerConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error> + Send + 'static,
    S::Future: Send + 'static,
{
    /// Bind a durable pull consumer with explicit acks for `settings.filter_subject`
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        settings: ConsumerSettings,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            filter_subject = %settings.filter_subject,
            "creating tower nats consumer"
        );

        let config = jetstream::consumer::pull::Config {
            name: Some(settings.consumer_name.clone()),
            durable_name: Some(settings.consumer_name.clone()),
            filter_subject: settings.filter_subject.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: settings.ack_wait,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(config, &settings.stream_name, settings.partition)
            .await
            .context("failed to create consumer")?;

        Ok(Self {
            consumer,
            settings,
            service,
        })
    }

    /// Run until `ctx` is cancelled.
    ///
    /// Cancellation stops new fetches and new records; a record already in the
    /// service runs to completion, and the rest of its batch is nak'ed. The same
    /// happens to the rest of a batch once any record in it is nak'ed.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.settings.stream_name,
            consumer = %self.settings.consumer_name,
            partition = self.settings.partition,
            "starting consumer"
        );

        loop {
            let fetched = tokio::select! {
                _ = ctx.cancelled() => break,
                fetched = self
                    .consumer
                    .fetch_messages(self.settings.batch_size, self.settings.max_wait) => fetched,
            };

            match fetched {
                Ok(batch) => self.process_batch(batch, &ctx).await,
                Err(e) => {
                    error!(
                        consumer = %self.settings.consumer_name,
                        error = %format!("{e:#}"),
                        "failed to fetch batch"
                    );
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(FETCH_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(
            consumer = %self.settings.consumer_name,
            "received shutdown signal, consumer stopped"
        );
        Ok(())
    }

    async fn process_batch(&mut self, batch: Vec<InboundMessage>, ctx: &CancellationToken) {
        if batch.is_empty() {
            return;
        }
        debug!(message_count = batch.len(), "received message batch");

        let mut messages = batch.into_iter();
        while let Some(message) = messages.next() {
            if ctx.is_cancelled() {
                settle(message, ConsumeResponse::nak("consumer shutting down")).await;
                for remaining in messages.by_ref() {
                    settle(remaining, ConsumeResponse::nak("consumer shutting down")).await;
                }
                return;
            }

            let request =
                ConsumeRequest::new(message.record.clone(), message.headers.clone(), ctx.clone());

            let response = match self.call_service(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        record = %message.record.coordinates,
                        error = %format!("{e:#}"),
                        "service error processing record"
                    );
                    ConsumeResponse::nak(e.to_string())
                }
            };

            // A nak'ed record comes back later; nothing behind it may settle first
            let handed_back = matches!(response, ConsumeResponse::Nak(_));
            settle(message, response).await;
            if handed_back {
                for remaining in messages.by_ref() {
                    settle(remaining, ConsumeResponse::nak("earlier record handed back")).await;
                }
                return;
            }
        }
    }

    async fn call_service(&mut self, request: ConsumeRequest) -> Result<ConsumeResponse> {
        self.service.ready().await?.call(request).await
    }
}

/// Settle a message exactly once; settle failures are logged, the server redelivers
async fn settle(message: InboundMessage, response: ConsumeResponse) {
    let coordinates = message.record.coordinates.clone();

    let result = match &response {
        ConsumeResponse::Ack => message.ack().await,
        ConsumeResponse::Nak(_) => message.nak().await,
    };

    if let Err(e) = result {
        error!(
            record = %coordinates,
            settle = response.as_str(),
            error = %format!("{e:#}"),
            "failed to settle record"
        );
    } else if let ConsumeResponse::Nak(reason) = &response {
        warn!(
            record = %coordinates,
            reason = reason.as_deref().unwrap_or("unspecified"),
            "record handed back for redelivery"
        );
    }
}
