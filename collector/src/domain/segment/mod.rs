//! Segment ingestion core
//!
//! - `proto` - Wire schema of upstream segments
//! - `decorator` - Mutable views over a decoded segment
//! - `exchange` - Identifier exchange contracts
//! - `listener` - Span listener roles and per-call dispatch
//! - `sink` - Persistence and buffer hand-off
//! - `parser` - Two-phase parse of a single segment
//! - `service` - Shared entry point

pub mod decorator;
mod error;
pub mod exchange;
pub mod listener;
mod parser;
pub mod proto;
mod service;
pub mod sink;

pub use error::SegmentParseError;
pub use service::{SegmentParseService, Source};
