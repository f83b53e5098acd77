use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Stream carrying inbound change proposals
    #[serde(default = "default_proposal_stream")]
    pub proposal_stream: String,

    /// Comma-separated subject filters, one partition consumer per entry
    #[serde(default = "default_proposal_subject_filters")]
    pub proposal_subject_filters: String,

    /// Stream receiving failure envelopes
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,

    /// Durable consumer name prefix shared by every replica
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Batch size for consumer
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Server-side redelivery timeout for unsettled records, in seconds
    #[serde(default = "default_nats_ack_wait_secs")]
    pub nats_ack_wait_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Metadata service
    /// Base URL of the metadata service
    #[serde(default = "default_gms_url")]
    pub gms_url: String,

    #[serde(default = "default_system_client_id")]
    pub system_client_id: String,

    #[serde(default)]
    pub system_client_secret: String,

    #[serde(default = "default_system_actor")]
    pub system_actor: String,

    // Retry
    /// Total ingest attempts per record, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Zero disables the delay between attempts
    #[serde(default)]
    pub retry_backoff_base_ms: u64,

    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    // Observability
    /// Listen address of the Prometheus scrape endpoint
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_proposal_stream() -> String {
    "MetadataChangeProposal_v1".to_string()
}

fn default_proposal_subject_filters() -> String {
    "MetadataChangeProposal_v1.*".to_string()
}

fn default_dead_letter_stream() -> String {
    "FailedMetadataChangeProposal_v1".to_string()
}

fn default_consumer_group() -> String {
    "generic-mce-consumer-job-client".to_string()
}

fn default_nats_batch_size() -> usize {
    10
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_nats_ack_wait_secs() -> u64 {
    600
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_gms_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_system_client_id() -> String {
    "__datahub_system".to_string()
}

fn default_system_actor() -> String {
    "urn:li:corpuser:__datahub_system".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_retry_backoff_max_ms() -> u64 {
    5_000
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "mcp-consumer".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("MCP"))
            .build()?
            .try_deserialize()
    }

    pub fn subject_filters(&self) -> Vec<String> {
        self.proposal_subject_filters
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn metrics_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics_addr.parse().map_err(|e| {
            ConfigError::Message(format!("invalid metrics_addr '{}': {}", self.metrics_addr, e))
        })
    }

    /// Longest a fetched batch can stay unsettled when every record exhausts its retries
    pub fn worst_case_batch_duration(&self) -> Duration {
        let backoff_ms = if self.retry_backoff_base_ms > 0 {
            self.retry_backoff_max_ms
        } else {
            0
        };
        let per_attempt_ms = self.attempt_timeout_ms.saturating_add(backoff_ms);
        let per_record_ms = per_attempt_ms.saturating_mul(u64::from(self.max_attempts));
        Duration::from_millis(per_record_ms.saturating_mul(self.nats_batch_size as u64))
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Message(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "attempt_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.subject_filters().is_empty() {
            return Err(ConfigError::Message(
                "proposal_subject_filters must name at least one subject".to_string(),
            ));
        }
        let ack_wait = Duration::from_secs(self.nats_ack_wait_secs);
        let worst_case = self.worst_case_batch_duration();
        if ack_wait <= worst_case {
            return Err(ConfigError::Message(format!(
                "nats_ack_wait_secs ({}s) must exceed the worst-case batch time of {}s \
                 (batch_size x max_attempts x (attempt_timeout + backoff_max))",
                self.nats_ack_wait_secs,
                worst_case.as_secs()
            )));
        }
        self.metrics_socket_addr()?;
        Ok(())
    }
}
