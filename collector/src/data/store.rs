//! In-memory segment storage
//!
//! Terminus of the persistence pipeline and target of the shipped listeners.
//! Concurrent maps keyed by segment id (or global trace id); writes with an
//! existing key replace the previous value.

use std::collections::BTreeSet;

use dashmap::DashMap;

use crate::domain::segment::sink::Segment;

/// Aggregate emitted per segment by the segment cost listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCost {
    pub segment_id: String,
    pub application_id: i32,
    pub service_name_id: i32,
    pub start_time: i64,
    pub end_time: i64,
    pub cost: i64,
    pub is_error: bool,
    pub time_bucket: i64,
}

#[derive(Default)]
pub struct SegmentStore {
    segments: DashMap<String, Segment>,
    costs: DashMap<String, SegmentCost>,
    global_traces: DashMap<String, BTreeSet<String>>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_segment(&self, segment: Segment) {
        self.segments.insert(segment.id.clone(), segment);
    }

    pub fn segment(&self, id: &str) -> Option<Segment> {
        self.segments.get(id).map(|entry| entry.value().clone())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn insert_cost(&self, cost: SegmentCost) {
        self.costs.insert(cost.segment_id.clone(), cost);
    }

    pub fn cost(&self, segment_id: &str) -> Option<SegmentCost> {
        self.costs.get(segment_id).map(|entry| entry.value().clone())
    }

    /// Record that `segment_id` takes part in `global_trace_id`.
    pub fn link_global_trace(&self, global_trace_id: &str, segment_id: &str) {
        self.global_traces
            .entry(global_trace_id.to_string())
            .or_default()
            .insert(segment_id.to_string());
    }

    /// Segment ids of a global trace, in id order.
    pub fn segments_of_trace(&self, global_trace_id: &str) -> Vec<String> {
        self.global_traces
            .get(global_trace_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}
