mod client;
mod inbound;
mod middleware;
mod tower_consumer;
mod trace_context;
mod traits;

pub use client::*;
pub use inbound::*;
pub use middleware::*;
pub use tower_consumer::*;
pub use trace_context::*;
pub use traits::*;
