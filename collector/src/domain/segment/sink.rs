//! Downstream hand-off records and sink contracts
//!
//! Both sinks are fire-and-forget: the parser never waits for, or observes,
//! the outcome of the stage behind them.

use super::proto::UpstreamSegment;

/// Record produced on the success path.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    /// Re-encoded segment after identifier exchange.
    pub data_binary: Vec<u8>,
    /// Minute bucket of the first span's start time.
    pub time_bucket: i64,
}

/// Record produced when identifiers could not be resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedSegment {
    pub id: String,
    /// Envelope exactly as received.
    pub upstream: UpstreamSegment,
}

pub trait PersistenceSink: Send + Sync {
    fn submit_for_persistence(&self, segment: Segment);
}

pub trait BufferSink: Send + Sync {
    fn submit_for_buffering(&self, buffered: BufferedSegment);
}
