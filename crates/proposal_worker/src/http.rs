mod metadata_service_sink;

pub use metadata_service_sink::*;
