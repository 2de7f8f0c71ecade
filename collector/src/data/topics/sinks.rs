//! Topic-backed segment sinks
//!
//! Publishing is the whole hand-off: a rejected publish is logged and the
//! record is dropped, the parser is never told.

use super::Publisher;
use crate::domain::segment::sink::{BufferSink, BufferedSegment, PersistenceSink, Segment};

impl PersistenceSink for Publisher<Segment> {
    fn submit_for_persistence(&self, segment: Segment) {
        let id = segment.id.clone();
        if let Err(e) = self.publish(segment) {
            tracing::warn!(error = %e, topic = self.topic(), segment_id = %id, "Failed to submit segment for persistence");
        }
    }
}

impl BufferSink for Publisher<BufferedSegment> {
    fn submit_for_buffering(&self, buffered: BufferedSegment) {
        let id = buffered.id.clone();
        if let Err(e) = self.publish(buffered) {
            tracing::warn!(error = %e, topic = self.topic(), segment_id = %id, "Failed to submit segment for buffering");
        }
    }
}
