//! Downstream segment pipelines
//!
//! - `persist` - Persistence topic to segment store
//! - `replay` - Buffer topic back into the parser

mod persist;
mod replay;

pub use persist::SegmentPersistPipeline;
pub use replay::BufferReplayPipeline;
