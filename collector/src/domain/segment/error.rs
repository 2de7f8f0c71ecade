//! Segment parse error types

use thiserror::Error;

/// Failures that escape a parse call.
///
/// Undecodable payloads and unresolved identifiers are absorbed by the parser
/// and reported as an uncommitted result instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentParseError {
    #[error("Segment {segment_id} contains multiple entry spans")]
    MultipleEntrySpans { segment_id: String },
}
