mod ingestion_metrics;
mod proposal_ingestion_service;
mod retry_policy;

pub use ingestion_metrics::*;
pub use proposal_ingestion_service::*;
pub use retry_policy::*;
