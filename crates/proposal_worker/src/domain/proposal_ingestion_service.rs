use crate::domain::{
    BoundedRetryPolicy, IngestionMetrics, NoDelay, RetryDecision, RetryDelay, RetryPolicy,
};
use chrono::Utc;
use common::{
    CodecError, DeadLetterSink, FailureEnvelope, Identity, IngestError, Proposal, ProposalCodec,
    ProposalSink, WireRecord,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Settings shared by every record the service processes
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Identity presented to the metadata service on every ingest call
    pub identity: Identity,
    /// Upper bound for a single ingest call; expiry counts as a transient failure
    pub attempt_timeout: Duration,
}

/// Terminal result of processing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The metadata service accepted the proposal on attempt `attempts`
    Ingested { attempts: u32 },
    /// Processing gave up; `published` is false when the dead-letter write failed
    DeadLettered { attempts: u32, published: bool },
    /// Shutdown interrupted retrying; the record must be redelivered
    Abandoned { attempts: u32 },
}

impl RecordOutcome {
    pub fn should_acknowledge(&self) -> bool {
        !matches!(self, RecordOutcome::Abandoned { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RecordOutcome::Ingested { attempts }
            | RecordOutcome::DeadLettered { attempts, .. }
            | RecordOutcome::Abandoned { attempts } => *attempts,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Ingested { .. } => "ingested",
            RecordOutcome::DeadLettered { .. } => "dead_lettered",
            RecordOutcome::Abandoned { .. } => "abandoned",
        }
    }
}

enum RecordState {
    Decoding,
    Forwarding { proposal: Proposal, attempt: u32 },
    DeadLettering { envelope: FailureEnvelope },
    Done(RecordOutcome),
}

/// Drives one record from decode to a terminal outcome:
/// decode, ingest with bounded retry, and dead-letter on give-up.
///
/// Decode and sink failures never escape; every path ends in a `RecordOutcome`.
pub struct ProposalIngestionService {
    codec: Arc<dyn ProposalCodec>,
    sink: Arc<dyn ProposalSink>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<IngestionMetrics>,
    retry_policy: Arc<dyn RetryPolicy>,
    retry_delay: Arc<dyn RetryDelay>,
    settings: IngestionSettings,
}

impl ProposalIngestionService {
    /// Uses `BoundedRetryPolicy::default()` and no delay between attempts
    pub fn new(
        codec: Arc<dyn ProposalCodec>,
        sink: Arc<dyn ProposalSink>,
        dead_letters: Arc<dyn DeadLetterSink>,
        metrics: Arc<IngestionMetrics>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            codec,
            sink,
            dead_letters,
            metrics,
            retry_policy: Arc::new(BoundedRetryPolicy::default()),
            retry_delay: Arc::new(NoDelay),
            settings,
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn with_retry_delay(mut self, delay: impl RetryDelay + 'static) -> Self {
        self.retry_delay = Arc::new(delay);
        self
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    /// Process one record to completion.
    ///
    /// `shutdown` is only consulted between attempts: an attempt in flight
    /// always completes, but no new attempt starts once it is cancelled.
    pub async fn process_record(
        &self,
        record: &WireRecord,
        shutdown: &CancellationToken,
    ) -> RecordOutcome {
        self.metrics.record_received(record.lag_at(Utc::now()));

        let mut state = RecordState::Decoding;
        loop {
            state = match state {
                RecordState::Decoding => self.decode(record),
                RecordState::Forwarding { proposal, attempt } => {
                    self.forward(record, proposal, attempt, shutdown).await
                }
                RecordState::DeadLettering { envelope } => {
                    RecordState::Done(self.dead_letter(envelope).await)
                }
                RecordState::Done(outcome) => return outcome,
            };
        }
    }

    fn decode(&self, record: &WireRecord) -> RecordState {
        match self.codec.decode(record) {
            Ok(proposal) => RecordState::Forwarding {
                proposal,
                attempt: 1,
            },
            Err(e) => {
                let envelope = FailureEnvelope::for_undecodable(record, &CodecError::from(e));
                warn!(
                    record = %record.coordinates,
                    error = %envelope.error().trace,
                    "undecodable record, dead-lettering without ingest"
                );
                RecordState::DeadLettering { envelope }
            }
        }
    }

    async fn forward(
        &self,
        record: &WireRecord,
        proposal: Proposal,
        attempt: u32,
        shutdown: &CancellationToken,
    ) -> RecordState {
        self.metrics.record_attempt();

        let ingest = self.sink.ingest(&proposal, &self.settings.identity);
        let result = match tokio::time::timeout(self.settings.attempt_timeout, ingest).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout(self.settings.attempt_timeout)),
        };

        let error = match result {
            Ok(()) => {
                self.metrics.record_ingested();
                debug!(
                    entity_urn = %proposal.entity_urn,
                    aspect = %proposal.aspect_name,
                    attempt,
                    "proposal ingested"
                );
                return RecordState::Done(RecordOutcome::Ingested { attempts: attempt });
            }
            Err(error) => error,
        };

        match self.retry_policy.decide(attempt, &error) {
            RetryDecision::Retry => {
                warn!(
                    entity_urn = %proposal.entity_urn,
                    aspect = %proposal.aspect_name,
                    attempt,
                    max_attempts = self.retry_policy.max_attempts(),
                    error = %error,
                    "ingest attempt failed, retrying"
                );

                if !self.wait_before_retry(attempt + 1, shutdown).await {
                    warn!(
                        record = %record.coordinates,
                        entity_urn = %proposal.entity_urn,
                        attempt,
                        "shutdown requested, abandoning record for redelivery"
                    );
                    return RecordState::Done(RecordOutcome::Abandoned { attempts: attempt });
                }

                self.metrics.record_retry();
                RecordState::Forwarding {
                    proposal,
                    attempt: attempt + 1,
                }
            }
            RetryDecision::GiveUp => {
                error!(
                    record = %record.coordinates,
                    entity_urn = %proposal.entity_urn,
                    entity_type = %proposal.entity_type,
                    aspect = %proposal.aspect_name,
                    change_kind = %proposal.change_kind,
                    attempts = attempt,
                    error = %error,
                    "failed to ingest proposal, dead-lettering"
                );
                RecordState::DeadLettering {
                    envelope: FailureEnvelope::for_proposal(proposal, &error, attempt, record),
                }
            }
        }
    }

    /// Returns false when shutdown arrives before the next attempt may start
    async fn wait_before_retry(&self, next_attempt: u32, shutdown: &CancellationToken) -> bool {
        if shutdown.is_cancelled() {
            return false;
        }

        let delay = self.retry_delay.delay_before(next_attempt);
        if delay.is_zero() {
            return true;
        }

        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn dead_letter(&self, envelope: FailureEnvelope) -> RecordOutcome {
        self.metrics.record_dead_lettered();
        let attempts = envelope.attempts();

        let payload = match self.codec.encode_failure(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.record_encode_anomaly();
                error!(
                    record = %envelope.source(),
                    error = %e,
                    failure = %envelope.error().message,
                    "could not encode failure envelope; record acknowledged without dead-letter entry"
                );
                return RecordOutcome::DeadLettered {
                    attempts,
                    published: false,
                };
            }
        };

        match self.dead_letters.publish(&envelope, payload).await {
            Ok(()) => RecordOutcome::DeadLettered {
                attempts,
                published: true,
            },
            Err(e) => {
                self.metrics.record_dead_letter_publish_failure();
                error!(
                    record = %envelope.source(),
                    error = %e,
                    "dead-letter publish failed, not retrying"
                );
                RecordOutcome::DeadLettered {
                    attempts,
                    published: false,
                }
            }
        }
    }
}
