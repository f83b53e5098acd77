#![cfg(feature = "integration-tests")]

use anyhow::{Result, anyhow};
use bytes::Bytes;
use common::change_proposal::v1::FailedChangeProposal;
use common::{
    AspectPayload, ChangeKind, Identity, IngestError, MockProposalSink, NatsClient, Proposal,
    ProtobufProposalCodec, encode_proposal,
};
use futures::StreamExt;
use prost::Message;
use proposal_worker::{
    DeadLetterProducer, IngestionMetrics, IngestionSettings, ProposalIngestionService,
    ProposalWorker, ProposalWorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};
use tokio_util::sync::CancellationToken;

const PROPOSAL_STREAM: &str = "MetadataChangeProposal_v1";
const DEAD_LETTER_STREAM: &str = "FailedMetadataChangeProposal_v1";

/// NATS server with JetStream enabled
#[derive(Debug, Clone)]
struct NatsWithJetStream {
    ports: Vec<ContainerPort>,
}

impl Default for NatsWithJetStream {
    fn default() -> Self {
        Self {
            ports: vec![ContainerPort::Tcp(4222)],
        }
    }
}

impl Image for NatsWithJetStream {
    fn name(&self) -> &str {
        "nats"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::seconds(3)]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        vec!["--js"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &self.ports
    }
}

async fn start_nats() -> Result<(ContainerAsync<NatsWithJetStream>, String)> {
    let nats = NatsWithJetStream::default().start().await?;
    let host = nats.get_host().await?;
    let port = nats.get_host_port_ipv4(4222).await?;
    Ok((nats, format!("nats://{}:{}", host, port)))
}

fn proposal(entity_urn: &str) -> Proposal {
    Proposal {
        entity_urn: entity_urn.to_string(),
        entity_type: "dataset".to_string(),
        aspect_name: "status".to_string(),
        change_kind: ChangeKind::Upsert,
        aspect: Some(AspectPayload::json(r#"{"active":true}"#)),
        system_metadata: None,
    }
}

/// Read up to `expected` dead letters, waiting at most a few seconds
async fn read_dead_letters(url: &str, expected: usize) -> Result<Vec<FailedChangeProposal>> {
    let client = async_nats::connect(url).await?;
    let jetstream = async_nats::jetstream::new(client);
    let stream = jetstream
        .get_stream(DEAD_LETTER_STREAM)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    let consumer: async_nats::jetstream::consumer::PullConsumer = stream
        .create_consumer(async_nats::jetstream::consumer::pull::Config {
            durable_name: Some("dead-letter-verifier".to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow!("{e}"))?;

    let mut failed = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while failed.len() < expected && tokio::time::Instant::now() < deadline {
        let mut messages = consumer
            .fetch()
            .max_messages(expected - failed.len())
            .expires(Duration::from_secs(1))
            .messages()
            .await
            .map_err(|e| anyhow!("{e}"))?;

        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| anyhow!("{e}"))?;
            failed.push(FailedChangeProposal::decode(message.payload.clone())?);
            message.ack().await.map_err(|e| anyhow!("{e}"))?;
        }
    }
    Ok(failed)
}

#[tokio::test]
async fn test_rejected_and_malformed_records_reach_dead_letter_stream() -> Result<()> {
    let (_nats, url) = start_nats().await?;

    let nats_client = NatsClient::connect(&url, Duration::from_secs(30)).await?;
    nats_client
        .ensure_stream(PROPOSAL_STREAM, "inbound change proposals")
        .await?;
    nats_client
        .ensure_stream(DEAD_LETTER_STREAM, "dead-lettered change proposals")
        .await?;

    let producer = async_nats::jetstream::new(async_nats::connect(&url).await?);
    let subject = format!("{PROPOSAL_STREAM}.0");
    for payload in [
        encode_proposal(&proposal("entityA")),
        encode_proposal(&proposal("entityB")),
        Bytes::from_static(b"\xff\xff\xff"),
    ] {
        producer
            .publish(subject.clone(), payload)
            .await
            .map_err(|e| anyhow!("{e}"))?
            .await
            .map_err(|e| anyhow!("{e}"))?;
    }

    let mut sink = MockProposalSink::new();
    sink.expect_ingest().returning(|proposal, _| {
        if proposal.entity_urn == "entityB" {
            Err(IngestError::permanent("422 Unprocessable Entity"))
        } else {
            Ok(())
        }
    });

    let metrics = Arc::new(IngestionMetrics::new());
    let ingestion = ProposalIngestionService::new(
        Arc::new(ProtobufProposalCodec),
        Arc::new(sink),
        Arc::new(DeadLetterProducer::new(
            nats_client.create_publisher_client(),
            DEAD_LETTER_STREAM,
        )),
        Arc::clone(&metrics),
        IngestionSettings {
            identity: Identity::new("urn:li:corpuser:system", "system", "secret"),
            attempt_timeout: Duration::from_secs(5),
        },
    );

    let worker = ProposalWorker::new(
        nats_client.create_consumer_client(),
        Arc::new(ingestion),
        ProposalWorkerConfig {
            stream: PROPOSAL_STREAM.to_string(),
            subject_filters: vec![subject.clone()],
            consumer_group: "generic-mce-consumer-job-client".to_string(),
            batch_size: 10,
            batch_wait: Duration::from_millis(500),
            ack_wait: Duration::from_secs(60),
        },
    )
    .await?;

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();
    for (_, process) in worker.into_runner_processes() {
        handles.push(tokio::spawn(process(shutdown.clone())));
    }

    let failed = read_dead_letters(&url, 2).await?;

    shutdown.cancel();
    for handle in handles {
        handle.await??;
    }

    assert_eq!(failed.len(), 2);

    let rejected = failed
        .iter()
        .find(|f| f.proposal.is_some())
        .ok_or_else(|| anyhow!("missing dead letter for rejected proposal"))?;
    assert_eq!(
        rejected.proposal.as_ref().map(|p| p.entity_urn.as_str()),
        Some("entityB")
    );
    assert_eq!(rejected.attempts, 1);
    assert!(rejected.error.contains("422"));

    let malformed = failed
        .iter()
        .find(|f| f.proposal.is_none())
        .ok_or_else(|| anyhow!("missing dead letter for malformed record"))?;
    assert_eq!(malformed.attempts, 0);
    assert_eq!(malformed.raw_payload, Bytes::from_static(b"\xff\xff\xff"));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.received, 3);
    assert_eq!(snapshot.ingested, 1);
    assert_eq!(snapshot.dead_lettered, 2);

    nats_client.close().await;
    Ok(())
}
