//! Span listeners shipped with the collector
//!
//! - `global_trace` - Global trace id to segment id index
//! - `segment_cost` - Per-segment duration and error flag

mod global_trace;
mod segment_cost;

use std::sync::Arc;

pub use global_trace::GlobalTraceSpanListener;
pub use segment_cost::SegmentCostSpanListener;

use crate::data::store::SegmentStore;
use crate::domain::segment::listener::{ListenerManager, SpanListener};

/// Register the factories of every shipped listener.
pub fn register_default_listeners(manager: &mut ListenerManager, store: &Arc<SegmentStore>) {
    let global_trace_store = Arc::clone(store);
    manager.add(Arc::new(move || {
        Box::new(GlobalTraceSpanListener::new(global_trace_store.clone())) as Box<dyn SpanListener>
    }));

    let segment_cost_store = Arc::clone(store);
    manager.add(Arc::new(move || {
        Box::new(SegmentCostSpanListener::new(segment_cost_store.clone())) as Box<dyn SpanListener>
    }));
}
