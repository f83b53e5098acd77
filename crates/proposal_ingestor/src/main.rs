mod config;
mod prometheus;

use common::{
    Identity, NatsClient, ProtobufProposalCodec, TelemetryConfig, TelemetryProviders,
    init_telemetry, shutdown_telemetry,
};
use crate::config::ServiceConfig;
use crate::prometheus::install_prometheus_exporter;
use ingest_runner::Runner;
use proposal_worker::{
    BoundedRetryPolicy, DeadLetterProducer, IngestionMetrics, IngestionSettings, JitteredBackoff,
    MetadataServiceSink, ProposalIngestionService, ProposalWorker, ProposalWorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env().and_then(|cfg| cfg.validate().map(|()| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {:#}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting change proposal consumer"
    );
    debug!(
        proposal_stream = %config.proposal_stream,
        dead_letter_stream = %config.dead_letter_stream,
        consumer_group = %config.consumer_group,
        max_attempts = config.max_attempts,
        "consumer configuration"
    );

    if let Err(e) = config
        .metrics_socket_addr()
        .map_err(anyhow::Error::from)
        .and_then(install_prometheus_exporter)
    {
        error!("Failed to start metrics exporter: {:#}", e);
        std::process::exit(1);
    }

    let nats_client = match initialize_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    let ingestion = match build_ingestion_service(&config, &nats_client) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to initialize ingestion service: {:#}", e);
            std::process::exit(1);
        }
    };

    let worker = match ProposalWorker::new(
        nats_client.create_consumer_client(),
        ingestion,
        ProposalWorkerConfig {
            stream: config.proposal_stream.clone(),
            subject_filters: config.subject_filters(),
            consumer_group: config.consumer_group.clone(),
            batch_size: config.nats_batch_size,
            batch_wait: Duration::from_secs(config.nats_batch_wait_secs),
            ack_wait: Duration::from_secs(config.nats_ack_wait_secs),
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize proposal worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();
    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            nats_client.close().await;

            // Shutdown telemetry and flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<NatsClient> {
    info!("Initializing NATS...");
    let client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;

    client
        .ensure_stream(&config.proposal_stream, "inbound metadata change proposals")
        .await?;
    client
        .ensure_stream(
            &config.dead_letter_stream,
            "change proposals that could not be ingested",
        )
        .await?;

    Ok(client)
}

fn build_ingestion_service(
    config: &ServiceConfig,
    nats_client: &NatsClient,
) -> anyhow::Result<ProposalIngestionService> {
    let attempt_timeout = Duration::from_millis(config.attempt_timeout_ms);
    let sink = MetadataServiceSink::new(&config.gms_url, attempt_timeout)?;
    let dead_letters =
        DeadLetterProducer::new(nats_client.create_publisher_client(), &config.dead_letter_stream);

    let service = ProposalIngestionService::new(
        Arc::new(ProtobufProposalCodec),
        Arc::new(sink),
        Arc::new(dead_letters),
        Arc::new(IngestionMetrics::new()),
        IngestionSettings {
            identity: Identity::new(
                &config.system_actor,
                &config.system_client_id,
                &config.system_client_secret,
            ),
            attempt_timeout,
        },
    )
    .with_retry_policy(BoundedRetryPolicy::new(config.max_attempts));

    if config.retry_backoff_base_ms == 0 {
        return Ok(service);
    }
    Ok(service.with_retry_delay(JitteredBackoff::new(
        Duration::from_millis(config.retry_backoff_base_ms),
        Duration::from_millis(config.retry_backoff_max_ms),
    )))
}
