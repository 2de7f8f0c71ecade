//! Mutable views over a decoded segment
//!
//! The decoded [`TraceSegmentObject`] is owned by a [`SegmentDecorator`] and
//! mutated in place while identifiers are exchanged. Values that are derived
//! during parsing but never travel on the wire (the per-span minute time
//! bucket) live in an overlay kept next to the decoded spans.

use prost::Message;

use super::proto::{SpanObject, SpanType, TraceSegmentObject, TraceSegmentReference, UniqueId};

pub struct SegmentDecorator {
    segment: TraceSegmentObject,
    minute_time_buckets: Vec<Option<i64>>,
}

impl SegmentDecorator {
    pub fn new(segment: TraceSegmentObject) -> Self {
        let minute_time_buckets = vec![None; segment.spans.len()];
        Self {
            segment,
            minute_time_buckets,
        }
    }

    /// Dot-joined segment identity. A segment without an id yields `""`.
    pub fn segment_id(&self) -> String {
        self.segment
            .trace_segment_id
            .as_ref()
            .map(UniqueId::to_dotted)
            .unwrap_or_default()
    }

    pub fn application_id(&self) -> i32 {
        self.segment.application_id
    }

    pub fn application_instance_id(&self) -> i32 {
        self.segment.application_instance_id
    }

    pub fn spans_count(&self) -> usize {
        self.segment.spans.len()
    }

    /// View of the span at `index`. Panics if out of range, like slice indexing.
    pub fn span(&mut self, index: usize) -> SpanDecorator<'_> {
        SpanDecorator {
            span: &mut self.segment.spans[index],
            minute_time_bucket: &mut self.minute_time_buckets[index],
        }
    }

    /// Re-encode the (possibly mutated) segment.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.segment.encode_to_vec()
    }
}

pub struct SpanDecorator<'a> {
    span: &'a mut SpanObject,
    minute_time_bucket: &'a mut Option<i64>,
}

impl SpanDecorator<'_> {
    pub fn span_id(&self) -> i32 {
        self.span.span_id
    }

    /// `None` when the wire value is not a known span type.
    pub fn span_type(&self) -> Option<SpanType> {
        SpanType::try_from(self.span.span_type).ok()
    }

    /// Raw wire value of the span type, for diagnostics.
    pub fn span_type_value(&self) -> i32 {
        self.span.span_type
    }

    pub fn start_time(&self) -> i64 {
        self.span.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.span.end_time
    }

    pub fn is_error(&self) -> bool {
        self.span.is_error
    }

    pub fn operation_name(&self) -> &str {
        &self.span.operation_name
    }

    pub fn operation_name_id(&self) -> i32 {
        self.span.operation_name_id
    }

    /// Set the resolved operation id; the name is dropped once an id exists.
    pub fn set_operation_name_id(&mut self, id: i32) {
        self.span.operation_name_id = id;
        self.span.operation_name.clear();
    }

    pub fn peer(&self) -> &str {
        &self.span.peer
    }

    pub fn peer_id(&self) -> i32 {
        self.span.peer_id
    }

    pub fn set_peer_id(&mut self, id: i32) {
        self.span.peer_id = id;
        self.span.peer.clear();
    }

    pub fn component(&self) -> &str {
        &self.span.component
    }

    pub fn component_id(&self) -> i32 {
        self.span.component_id
    }

    pub fn set_component_id(&mut self, id: i32) {
        self.span.component_id = id;
        self.span.component.clear();
    }

    pub fn start_time_minute_time_bucket(&self) -> Option<i64> {
        *self.minute_time_bucket
    }

    pub fn set_start_time_minute_time_bucket(&mut self, bucket: i64) {
        *self.minute_time_bucket = Some(bucket);
    }

    pub fn refs_count(&self) -> usize {
        self.span.refs.len()
    }

    pub fn reference(&mut self, index: usize) -> ReferenceDecorator<'_> {
        ReferenceDecorator {
            reference: &mut self.span.refs[index],
        }
    }
}

pub struct ReferenceDecorator<'a> {
    reference: &'a mut TraceSegmentReference,
}

impl ReferenceDecorator<'_> {
    pub fn entry_service_name(&self) -> &str {
        &self.reference.entry_service_name
    }

    pub fn entry_service_id(&self) -> i32 {
        self.reference.entry_service_id
    }

    pub fn set_entry_service_id(&mut self, id: i32) {
        self.reference.entry_service_id = id;
        self.reference.entry_service_name.clear();
    }

    pub fn parent_service_name(&self) -> &str {
        &self.reference.parent_service_name
    }

    pub fn parent_service_id(&self) -> i32 {
        self.reference.parent_service_id
    }

    pub fn set_parent_service_id(&mut self, id: i32) {
        self.reference.parent_service_id = id;
        self.reference.parent_service_name.clear();
    }

    pub fn network_address(&self) -> &str {
        &self.reference.network_address
    }

    pub fn network_address_id(&self) -> i32 {
        self.reference.network_address_id
    }

    pub fn set_network_address_id(&mut self, id: i32) {
        self.reference.network_address_id = id;
        self.reference.network_address.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> TraceSegmentObject {
        TraceSegmentObject {
            trace_segment_id: Some(UniqueId::new(vec![1, 2, 3])),
            application_id: 10,
            application_instance_id: 11,
            spans: vec![SpanObject {
                span_id: 0,
                operation_name: "/orders".to_string(),
                peer: "db:3306".to_string(),
                refs: vec![TraceSegmentReference {
                    network_address: "10.0.0.1:8080".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_segment_id_dotted() {
        let decorator = SegmentDecorator::new(segment());
        assert_eq!(decorator.segment_id(), "1.2.3");
    }

    #[test]
    fn test_segment_id_missing_is_empty() {
        let decorator = SegmentDecorator::new(TraceSegmentObject::default());
        assert_eq!(decorator.segment_id(), "");
    }

    #[test]
    fn test_setting_ids_clears_names() {
        let mut decorator = SegmentDecorator::new(segment());
        let mut span = decorator.span(0);
        span.set_operation_name_id(5);
        span.set_peer_id(6);
        assert_eq!(span.operation_name(), "");
        assert_eq!(span.operation_name_id(), 5);
        assert_eq!(span.peer(), "");
        assert_eq!(span.peer_id(), 6);

        let mut reference = span.reference(0);
        reference.set_network_address_id(7);
        assert_eq!(reference.network_address(), "");
        assert_eq!(reference.network_address_id(), 7);
    }

    #[test]
    fn test_minute_bucket_overlay_is_not_serialized() {
        let mut decorator = SegmentDecorator::new(segment());
        let before = decorator.to_bytes();

        decorator.span(0).set_start_time_minute_time_bucket(202401011230);
        assert_eq!(
            decorator.span(0).start_time_minute_time_bucket(),
            Some(202401011230)
        );
        assert_eq!(decorator.to_bytes(), before);
    }

    #[test]
    fn test_mutations_are_serialized() {
        let mut decorator = SegmentDecorator::new(segment());
        decorator.span(0).set_operation_name_id(42);

        let decoded = TraceSegmentObject::decode(decorator.to_bytes().as_slice()).unwrap();
        assert_eq!(decoded.spans[0].operation_name_id, 42);
        assert!(decoded.spans[0].operation_name.is_empty());
    }
}
