//! Segment cost listener
//!
//! Records the duration of a segment (taken from its first span) and whether
//! any of its spans failed.

use std::sync::Arc;

use crate::data::store::{SegmentCost, SegmentStore};
use crate::domain::segment::decorator::SpanDecorator;
use crate::domain::segment::listener::{
    EntrySpanListener, ExitSpanListener, FirstSpanListener, LocalSpanListener, SegmentContext,
    SpanListener,
};
use crate::utils::time::minute_time_bucket;

pub struct SegmentCostSpanListener {
    store: Arc<SegmentStore>,
    cost: Option<SegmentCost>,
    is_error: bool,
}

impl SegmentCostSpanListener {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self {
            store,
            cost: None,
            is_error: false,
        }
    }

    fn observe(&mut self, span: &SpanDecorator<'_>) {
        self.is_error |= span.is_error();
    }
}

impl SpanListener for SegmentCostSpanListener {
    fn build(&mut self) {
        if let Some(mut cost) = self.cost.take() {
            cost.is_error = self.is_error;
            tracing::trace!(segment_id = %cost.segment_id, cost = cost.cost, "Segment cost recorded");
            self.store.insert_cost(cost);
        }
    }

    fn as_first_span_listener(&mut self) -> Option<&mut dyn FirstSpanListener> {
        Some(self)
    }

    fn as_entry_span_listener(&mut self) -> Option<&mut dyn EntrySpanListener> {
        Some(self)
    }

    fn as_exit_span_listener(&mut self) -> Option<&mut dyn ExitSpanListener> {
        Some(self)
    }

    fn as_local_span_listener(&mut self) -> Option<&mut dyn LocalSpanListener> {
        Some(self)
    }
}

impl FirstSpanListener for SegmentCostSpanListener {
    fn parse_first(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        self.cost = Some(SegmentCost {
            segment_id: context.segment_id.to_string(),
            application_id: context.application_id,
            service_name_id: span.operation_name_id(),
            start_time: span.start_time(),
            end_time: span.end_time(),
            cost: span.end_time() - span.start_time(),
            is_error: false,
            time_bucket: minute_time_bucket(span.start_time()),
        });
    }
}

impl EntrySpanListener for SegmentCostSpanListener {
    fn parse_entry(&mut self, span: &SpanDecorator<'_>, _context: &SegmentContext<'_>) {
        self.observe(span);
    }
}

impl ExitSpanListener for SegmentCostSpanListener {
    fn parse_exit(&mut self, span: &SpanDecorator<'_>, _context: &SegmentContext<'_>) {
        self.observe(span);
    }
}

impl LocalSpanListener for SegmentCostSpanListener {
    fn parse_local(&mut self, span: &SpanDecorator<'_>, _context: &SegmentContext<'_>) {
        self.observe(span);
    }
}
