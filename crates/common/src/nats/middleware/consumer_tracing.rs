use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::nats::trace_context::link_span_to_headers;
use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{Instrument, Span, field, info_span};

/// Tower layer that opens the `mcp_consume` span for each record
#[derive(Clone, Default)]
pub struct NatsConsumeTracingLayer;

impl NatsConsumeTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeTracingLayer {
    type Service = NatsConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeTracingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsConsumeTracingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for NatsConsumeTracingService<S>
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
        let coordinates = &req.record.coordinates;

        let span = info_span!(
            target: "nats",
            "mcp_consume",
            otel.name = "mcp_consume",
            otel.kind = "consumer",
            messaging.system = "nats",
            messaging.operation = "process",
            messaging.destination.name = %coordinates.subject,
            messaging.destination.partition.id = coordinates.partition,
            messaging.message.id = coordinates.stream_sequence,
            messaging.message.body.size = req.record.payload.len(),
            messaging.message.delivery_count = req.record.delivered,
            otel.status_code = field::Empty,
        );
        link_span_to_headers(&span, req.headers.as_ref());

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;

                let status = match &result {
                    Ok(ConsumeResponse::Ack) => "OK",
                    Ok(ConsumeResponse::Nak(_)) | Err(_) => "ERROR",
                };
                Span::current().record("otel.status_code", status);

                result
            }
            .instrument(span),
        )
    }
}
