use crate::domain::ProposalIngestionService;
use common::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::debug;

/// Tower service that runs one inbound record through the ingestion service.
///
/// Every terminal outcome is acked. Only a record abandoned during shutdown is
/// nak'ed, so the log hands it to whichever consumer picks up the partition next.
#[derive(Clone)]
pub struct ProposalConsumerService {
    ingestion: Arc<ProposalIngestionService>,
}

impl ProposalConsumerService {
    pub fn new(ingestion: Arc<ProposalIngestionService>) -> Self {
        Self { ingestion }
    }
}

impl Service<ConsumeRequest> for ProposalConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let ingestion = Arc::clone(&self.ingestion);

        Box::pin(async move {
            let outcome = ingestion.process_record(&req.record, &req.shutdown).await;
            debug!(
                record = %req.record.coordinates,
                outcome = outcome.as_str(),
                attempts = outcome.attempts(),
                "record processed"
            );

            if outcome.should_acknowledge() {
                Ok(ConsumeResponse::Ack)
            } else {
                Ok(ConsumeResponse::nak(format!(
                    "shutdown after {} attempt(s)",
                    outcome.attempts()
                )))
            }
        })
    }
}
