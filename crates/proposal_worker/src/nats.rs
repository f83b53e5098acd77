mod dead_letter_producer;
mod proposal_consumer_service;

pub use dead_letter_producer::*;
pub use proposal_consumer_service::*;
