pub mod domain;
pub mod http;
pub mod nats;
pub mod proposal_worker;

pub use domain::*;
pub use http::*;
pub use nats::*;
pub use proposal_worker::*;
