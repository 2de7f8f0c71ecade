//! Segment wire schema
//!
//! Hand-maintained prost messages for the upstream segment envelope and the
//! trace segment it carries. Field tags are a fixed cross-process contract
//! with the agents and must not be renumbered.

/// Distributed identifier made of ordered integer parts.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct UniqueId {
    #[prost(int64, repeated, tag = "1")]
    pub id_parts: ::prost::alloc::vec::Vec<i64>,
}

impl UniqueId {
    pub fn new(id_parts: impl Into<Vec<i64>>) -> Self {
        Self {
            id_parts: id_parts.into(),
        }
    }

    /// Dot-joined decimal form, e.g. `[123, 456, 789]` -> `"123.456.789"`.
    pub fn to_dotted(&self) -> String {
        self.id_parts
            .iter()
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Envelope submitted by an agent: the encoded segment plus the global trace
/// ids it participates in.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpstreamSegment {
    #[prost(message, repeated, tag = "1")]
    pub global_trace_ids: ::prost::alloc::vec::Vec<UniqueId>,
    /// Encoded [`TraceSegmentObject`].
    #[prost(bytes = "vec", tag = "2")]
    pub segment: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TraceSegmentObject {
    #[prost(message, optional, tag = "1")]
    pub trace_segment_id: ::core::option::Option<UniqueId>,
    #[prost(message, repeated, tag = "3")]
    pub spans: ::prost::alloc::vec::Vec<SpanObject>,
    #[prost(int32, tag = "4")]
    pub application_id: i32,
    #[prost(int32, tag = "5")]
    pub application_instance_id: i32,
    #[prost(bool, tag = "6")]
    pub is_size_limited: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpanObject {
    #[prost(int32, tag = "1")]
    pub span_id: i32,
    #[prost(int32, tag = "2")]
    pub parent_span_id: i32,
    /// Epoch millis.
    #[prost(int64, tag = "3")]
    pub start_time: i64,
    /// Epoch millis.
    #[prost(int64, tag = "4")]
    pub end_time: i64,
    #[prost(message, repeated, tag = "5")]
    pub refs: ::prost::alloc::vec::Vec<TraceSegmentReference>,
    #[prost(int32, tag = "6")]
    pub operation_name_id: i32,
    #[prost(string, tag = "7")]
    pub operation_name: ::prost::alloc::string::String,
    #[prost(int32, tag = "8")]
    pub peer_id: i32,
    #[prost(string, tag = "9")]
    pub peer: ::prost::alloc::string::String,
    #[prost(enumeration = "SpanType", tag = "10")]
    pub span_type: i32,
    #[prost(int32, tag = "11")]
    pub span_layer: i32,
    #[prost(int32, tag = "12")]
    pub component_id: i32,
    #[prost(string, tag = "13")]
    pub component: ::prost::alloc::string::String,
    #[prost(bool, tag = "14")]
    pub is_error: bool,
    #[prost(message, repeated, tag = "15")]
    pub tags: ::prost::alloc::vec::Vec<KeyWithStringValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TraceSegmentReference {
    #[prost(int32, tag = "1")]
    pub ref_type: i32,
    #[prost(message, optional, tag = "2")]
    pub parent_trace_segment_id: ::core::option::Option<UniqueId>,
    #[prost(int32, tag = "3")]
    pub parent_span_id: i32,
    #[prost(int32, tag = "4")]
    pub parent_application_instance_id: i32,
    #[prost(string, tag = "5")]
    pub network_address: ::prost::alloc::string::String,
    #[prost(int32, tag = "6")]
    pub network_address_id: i32,
    #[prost(int32, tag = "7")]
    pub entry_application_instance_id: i32,
    #[prost(string, tag = "8")]
    pub entry_service_name: ::prost::alloc::string::String,
    #[prost(int32, tag = "9")]
    pub entry_service_id: i32,
    #[prost(string, tag = "10")]
    pub parent_service_name: ::prost::alloc::string::String,
    #[prost(int32, tag = "11")]
    pub parent_service_id: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyWithStringValue {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SpanType {
    Entry = 0,
    Exit = 1,
    Local = 2,
}
