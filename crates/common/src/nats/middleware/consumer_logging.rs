use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{Instrument, Span, error, info, warn};

/// Tower layer that writes one log line per consumed record
#[derive(Clone, Default)]
pub struct NatsConsumeLoggingLayer;

impl NatsConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeLoggingLayer {
    type Service = NatsConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for NatsConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let coordinates = req.record.coordinates.to_string();
        let payload_size = req.record.payload.len();
        let delivered = req.record.delivered;
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(ConsumeResponse::Ack) => {
                        info!(
                            record = %coordinates,
                            payload_bytes = payload_size,
                            delivered,
                            outcome = "ack",
                            duration_ms = %duration_ms,
                            "consumed {coordinates} in {duration_ms}ms [ack]"
                        );
                    }
                    Ok(ConsumeResponse::Nak(reason)) => {
                        warn!(
                            record = %coordinates,
                            payload_bytes = payload_size,
                            delivered,
                            outcome = "nak",
                            reason = reason.as_deref().unwrap_or(""),
                            duration_ms = %duration_ms,
                            "consumed {coordinates} in {duration_ms}ms [nak]"
                        );
                    }
                    Err(e) => {
                        error!(
                            record = %coordinates,
                            payload_bytes = payload_size,
                            delivered,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to consume {coordinates} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
