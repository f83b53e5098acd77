//! Wire schema for change proposals and their dead-letter records.
//!
//! Declared with `prost` derives so the crate needs no build script; tags
//! are the stable contract with producers and must never be reused.

pub mod v1 {
    use std::collections::HashMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ChangeKind {
        Unspecified = 0,
        Upsert = 1,
        Delete = 2,
        Patch = 3,
        Restate = 4,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GenericAspect {
        #[prost(bytes = "bytes", tag = "1")]
        pub value: ::prost::bytes::Bytes,
        #[prost(string, tag = "2")]
        pub content_type: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SystemMetadata {
        #[prost(string, optional, tag = "1")]
        pub run_id: Option<String>,
        #[prost(int64, optional, tag = "2")]
        pub last_observed_ms: Option<i64>,
        #[prost(map = "string, string", tag = "3")]
        pub properties: HashMap<String, String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChangeProposal {
        #[prost(string, tag = "1")]
        pub entity_urn: String,
        #[prost(string, tag = "2")]
        pub entity_type: String,
        #[prost(string, tag = "3")]
        pub aspect_name: String,
        #[prost(enumeration = "ChangeKind", tag = "4")]
        pub change_kind: i32,
        #[prost(message, optional, tag = "5")]
        pub aspect: Option<GenericAspect>,
        #[prost(message, optional, tag = "6")]
        pub system_metadata: Option<SystemMetadata>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FailedChangeProposal {
        /// Absent when the inbound record never decoded
        #[prost(message, optional, tag = "1")]
        pub proposal: Option<ChangeProposal>,
        /// Error message followed by its cause chain
        #[prost(string, tag = "2")]
        pub error: String,
        #[prost(message, optional, tag = "3")]
        pub failed_at: Option<::prost_types::Timestamp>,
        #[prost(uint32, tag = "4")]
        pub attempts: u32,
        #[prost(string, tag = "5")]
        pub source_subject: String,
        #[prost(uint64, tag = "6")]
        pub source_sequence: u64,
        #[prost(bytes = "bytes", tag = "7")]
        pub raw_payload: ::prost::bytes::Bytes,
        #[prost(uint32, tag = "8")]
        pub source_partition: u32,
    }
}
