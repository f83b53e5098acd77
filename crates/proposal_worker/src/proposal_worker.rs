use crate::domain::ProposalIngestionService;
use crate::nats::ProposalConsumerService;
use anyhow::{Result, ensure};
use common::{
    ConsumerSettings, JetStreamConsumer, NatsConsumeLoggingLayer, NatsConsumeLoggingService,
    NatsConsumeTracingLayer, NatsConsumeTracingService, TowerConsumer,
};
use ingest_runner::{AppProcess, app_process};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tracing::info;

type ProposalConsumeStack =
    NatsConsumeTracingService<NatsConsumeLoggingService<ProposalConsumerService>>;

pub struct ProposalWorkerConfig {
    pub stream: String,
    /// One partition per filter, in order; the index is the partition number
    pub subject_filters: Vec<String>,
    pub consumer_group: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub ack_wait: Duration,
}

/// One sequential consumer per partition, all sharing the same ingestion service
pub struct ProposalWorker {
    consumers: Vec<(String, TowerConsumer<ProposalConsumeStack>)>,
}

impl ProposalWorker {
    pub async fn new(
        consumer_client: Arc<dyn JetStreamConsumer>,
        ingestion: Arc<ProposalIngestionService>,
        config: ProposalWorkerConfig,
    ) -> Result<Self> {
        ensure!(
            !config.subject_filters.is_empty(),
            "at least one subject filter is required"
        );
        info!(
            stream = %config.stream,
            consumer_group = %config.consumer_group,
            partitions = config.subject_filters.len(),
            "initializing proposal worker"
        );

        let mut consumers = Vec::with_capacity(config.subject_filters.len());
        for (partition, filter_subject) in config.subject_filters.iter().enumerate() {
            let settings = ConsumerSettings {
                stream_name: config.stream.clone(),
                consumer_name: format!("{}-{}", config.consumer_group, partition),
                filter_subject: filter_subject.clone(),
                partition,
                batch_size: config.batch_size,
                max_wait: config.batch_wait,
                ack_wait: config.ack_wait,
            };
            let name = settings.consumer_name.clone();

            let service = ServiceBuilder::new()
                .layer(NatsConsumeTracingLayer::new())
                .layer(NatsConsumeLoggingLayer::new())
                .service(ProposalConsumerService::new(Arc::clone(&ingestion)));

            let consumer = TowerConsumer::new(Arc::clone(&consumer_client), settings, service).await?;
            consumers.push((name, consumer));
        }

        info!("proposal worker initialized");
        Ok(Self { consumers })
    }

    pub fn partition_count(&self) -> usize {
        self.consumers.len()
    }

    /// One named runner process per partition consumer
    pub fn into_runner_processes(self) -> Vec<(String, AppProcess)> {
        self.consumers
            .into_iter()
            .map(|(name, consumer)| {
                let process = app_process(move |ctx| async move { consumer.run(ctx).await });
                (name, process)
            })
            .collect()
    }
}
