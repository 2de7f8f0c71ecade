//! Global trace index listener
//!
//! Links every global trace id carried by a committed segment to that
//! segment's id.

use std::sync::Arc;

use crate::data::store::SegmentStore;
use crate::domain::segment::decorator::SpanDecorator;
use crate::domain::segment::listener::{
    FirstSpanListener, GlobalTraceIdsListener, SegmentContext, SpanListener,
};
use crate::domain::segment::proto::UniqueId;

pub struct GlobalTraceSpanListener {
    store: Arc<SegmentStore>,
    global_trace_ids: Vec<String>,
    segment_id: Option<String>,
}

impl GlobalTraceSpanListener {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self {
            store,
            global_trace_ids: Vec::new(),
            segment_id: None,
        }
    }
}

impl SpanListener for GlobalTraceSpanListener {
    fn build(&mut self) {
        let Some(segment_id) = self.segment_id.as_deref() else {
            tracing::debug!("Segment had no first span, global trace ids not linked");
            return;
        };
        for global_trace_id in &self.global_trace_ids {
            self.store.link_global_trace(global_trace_id, segment_id);
        }
    }

    fn as_global_trace_ids_listener(&mut self) -> Option<&mut dyn GlobalTraceIdsListener> {
        Some(self)
    }

    fn as_first_span_listener(&mut self) -> Option<&mut dyn FirstSpanListener> {
        Some(self)
    }
}

impl GlobalTraceIdsListener for GlobalTraceSpanListener {
    fn parse_global_trace_id(&mut self, global_trace_id: &UniqueId) {
        self.global_trace_ids.push(global_trace_id.to_dotted());
    }
}

impl FirstSpanListener for GlobalTraceSpanListener {
    fn parse_first(&mut self, _span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        self.segment_id = Some(context.segment_id.to_string());
    }
}
