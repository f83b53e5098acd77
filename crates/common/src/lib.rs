mod domain;
mod nats;
mod proto;
mod telemetry;

pub use domain::*;
pub use nats::*;
pub use proto::*;
pub use telemetry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeadLetterSink;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockProposalCodec;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockProposalSink;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockMessageAcker;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
