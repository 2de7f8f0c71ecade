//! Segment parse service
//!
//! Shared entry point for segment ingestion. Holds the process-wide
//! collaborators (listener factories, exchangers, sinks) and runs every
//! submission through a fresh, call-scoped [`SegmentParse`].

use std::fmt;
use std::sync::Arc;

use super::error::SegmentParseError;
use super::exchange::{ReferenceIdExchanger, SpanIdExchanger};
use super::listener::ListenerManager;
use super::parser::SegmentParse;
use super::proto::UpstreamSegment;
use super::sink::{BufferSink, PersistenceSink};

/// Origin of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Live agent submission; eligible for buffering.
    Agent,
    /// Replay of a previously buffered submission; never re-buffered.
    Buffer,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Agent => write!(f, "agent"),
            Source::Buffer => write!(f, "buffer"),
        }
    }
}

pub struct SegmentParseService {
    listener_manager: Arc<ListenerManager>,
    span_exchanger: Arc<dyn SpanIdExchanger>,
    reference_exchanger: Arc<dyn ReferenceIdExchanger>,
    persistence: Arc<dyn PersistenceSink>,
    buffer: Arc<dyn BufferSink>,
}

impl SegmentParseService {
    pub fn new(
        listener_manager: Arc<ListenerManager>,
        span_exchanger: Arc<dyn SpanIdExchanger>,
        reference_exchanger: Arc<dyn ReferenceIdExchanger>,
        persistence: Arc<dyn PersistenceSink>,
        buffer: Arc<dyn BufferSink>,
    ) -> Self {
        Self {
            listener_manager,
            span_exchanger,
            reference_exchanger,
            persistence,
            buffer,
        }
    }

    /// Parse one upstream segment.
    ///
    /// `Ok(true)`: handed to persistence. `Ok(false)`: undecodable (dropped) or
    /// identifiers not resolvable yet (buffered when `source` is
    /// [`Source::Agent`]). `Err`: the segment is structurally invalid; it is
    /// neither persisted nor buffered.
    pub async fn parse(
        &self,
        upstream: UpstreamSegment,
        source: Source,
    ) -> Result<bool, SegmentParseError> {
        SegmentParse::new(self).parse(upstream, source).await
    }

    pub(super) fn listener_manager(&self) -> &ListenerManager {
        &self.listener_manager
    }

    pub(super) fn span_exchanger(&self) -> &dyn SpanIdExchanger {
        self.span_exchanger.as_ref()
    }

    pub(super) fn reference_exchanger(&self) -> &dyn ReferenceIdExchanger {
        self.reference_exchanger.as_ref()
    }

    pub(super) fn persistence(&self) -> &dyn PersistenceSink {
        self.persistence.as_ref()
    }

    pub(super) fn buffer(&self) -> &dyn BufferSink {
        self.buffer.as_ref()
    }
}
