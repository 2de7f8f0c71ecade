//! Domain logic for segment ingestion
//!
//! - `segment` - Decode, resolve and dispatch of upstream segments
//! - `listeners` - Span listeners shipped with the collector
//! - `pipeline` - Persistence and buffer replay stages

pub mod listeners;
pub mod pipeline;
pub mod segment;

pub use pipeline::{BufferReplayPipeline, SegmentPersistPipeline};
pub use segment::{SegmentParseError, SegmentParseService, Source};

use prost::Message;

use crate::data::topics::TopicMessage;
use segment::sink::{BufferedSegment, Segment};

impl TopicMessage for Segment {
    fn size_bytes(&self) -> usize {
        self.id.len() + self.data_binary.len()
    }
}

impl TopicMessage for BufferedSegment {
    fn size_bytes(&self) -> usize {
        self.id.len() + self.upstream.encoded_len()
    }
}
