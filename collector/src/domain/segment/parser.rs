//! Segment parse orchestration
//!
//! One [`SegmentParse`] runs one upstream segment through:
//!
//! ```text
//! decode ──▶ resolve (phase 1) ──ok──▶ dispatch (phase 2) ──▶ build listeners ──▶ persist
//!   │               │
//!   │               └─unresolved──▶ buffer (agent submissions only)
//!   └─malformed──▶ drop
//! ```
//!
//! Phase 1 notifies global trace id listeners, checks that the segment has at
//! most one entry span and exchanges every span and reference identifier,
//! stopping at the first one that cannot be resolved. Phase 2 only runs on a
//! fully resolved segment and is the only place span listeners are notified.
//!
//! Every stage is timed and the durations are logged at `debug` once the call
//! finishes.

use std::time::{Duration, Instant};

use prost::Message;

use super::decorator::SegmentDecorator;
use super::error::SegmentParseError;
use super::listener::{SegmentContext, SpanListeners};
use super::proto::{SpanType, TraceSegmentObject, UniqueId, UpstreamSegment};
use super::service::{SegmentParseService, Source};
use super::sink::{BufferedSegment, Segment};
use crate::utils::time::minute_time_bucket;

/// Outcome of phase 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Resolved,
    Pending,
}

/// Wall time spent in each stage of one parse call. A stage that did not run
/// stays `None`.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct StageTimings {
    pub listener_creation: Duration,
    pub decode: Option<Duration>,
    pub resolve: Option<Duration>,
    pub buffer_write: Option<Duration>,
    pub dispatch: Option<Duration>,
    pub listener_build: Option<Duration>,
    pub persist: Option<Duration>,
}

impl StageTimings {
    fn log(&self, segment_id: &str, source: Source) {
        let micros = |stage: Option<Duration>| stage.map(|d| d.as_micros() as u64);
        tracing::debug!(
            segment_id = %segment_id,
            source = %source,
            listener_creation_us = self.listener_creation.as_micros() as u64,
            decode_us = micros(self.decode),
            resolve_us = micros(self.resolve),
            buffer_write_us = micros(self.buffer_write),
            dispatch_us = micros(self.dispatch),
            listener_build_us = micros(self.listener_build),
            persist_us = micros(self.persist),
            "Segment parse timings"
        );
    }
}

/// State of a single parse call. Never shared or reused across calls.
pub(super) struct SegmentParse<'a> {
    service: &'a SegmentParseService,
    listeners: SpanListeners,
    segment_id: String,
    time_bucket: i64,
    timings: StageTimings,
}

impl<'a> SegmentParse<'a> {
    pub(super) fn new(service: &'a SegmentParseService) -> Self {
        let start = Instant::now();
        let listeners = SpanListeners::create(service.listener_manager());
        Self {
            service,
            listeners,
            segment_id: String::new(),
            time_bucket: 0,
            timings: StageTimings {
                listener_creation: start.elapsed(),
                ..Default::default()
            },
        }
    }

    /// Returns `Ok(true)` once the segment is handed to persistence and
    /// `Ok(false)` when it was dropped or buffered.
    pub(super) async fn parse(
        self,
        upstream: UpstreamSegment,
        source: Source,
    ) -> Result<bool, SegmentParseError> {
        let (result, segment_id, timings) = self.run(upstream, source).await;
        timings.log(&segment_id, source);
        result
    }

    async fn run(
        mut self,
        upstream: UpstreamSegment,
        source: Source,
    ) -> (Result<bool, SegmentParseError>, String, StageTimings) {
        let start = Instant::now();
        let decoded = TraceSegmentObject::decode(upstream.segment.as_slice());
        self.timings.decode = Some(start.elapsed());
        let mut segment = match decoded {
            Ok(segment) => SegmentDecorator::new(segment),
            Err(e) => {
                tracing::error!(error = %e, source = %source, "Failed to decode trace segment, dropping");
                return (Ok(false), self.segment_id, self.timings);
            }
        };

        let start = Instant::now();
        let resolution = self.resolve(&upstream.global_trace_ids, &mut segment).await;
        self.timings.resolve = Some(start.elapsed());
        match resolution {
            Ok(Resolution::Resolved) => {}
            Ok(Resolution::Pending) => {
                tracing::debug!(
                    segment_id = %self.segment_id,
                    source = %source,
                    "Segment id exchange not complete"
                );
                if source == Source::Agent {
                    let start = Instant::now();
                    self.write_to_buffer(upstream);
                    self.timings.buffer_write = Some(start.elapsed());
                }
                return (Ok(false), self.segment_id, self.timings);
            }
            Err(e) => return (Err(e), self.segment_id, self.timings),
        }

        tracing::debug!(segment_id = %self.segment_id, "Segment id exchange complete");
        let start = Instant::now();
        self.dispatch(&mut segment);
        self.timings.dispatch = Some(start.elapsed());

        let Self {
            listeners,
            segment_id,
            time_bucket,
            service,
            mut timings,
        } = self;

        let start = Instant::now();
        listeners.build();
        timings.listener_build = Some(start.elapsed());

        let start = Instant::now();
        service.persistence().submit_for_persistence(Segment {
            id: segment_id.clone(),
            data_binary: segment.to_bytes(),
            time_bucket,
        });
        timings.persist = Some(start.elapsed());

        (Ok(true), segment_id, timings)
    }

    /// Phase 1: notify global trace ids, validate structure and exchange ids.
    async fn resolve(
        &mut self,
        global_trace_ids: &[UniqueId],
        segment: &mut SegmentDecorator,
    ) -> Result<Resolution, SegmentParseError> {
        self.segment_id = segment.segment_id();

        for global_trace_id in global_trace_ids {
            self.listeners.notify_global_trace_id(global_trace_id);
        }

        self.check_entry_spans(segment)?;

        let application_id = segment.application_id();
        for i in 0..segment.spans_count() {
            let mut span = segment.span(i);

            if !self
                .service
                .span_exchanger()
                .exchange(&mut span, application_id)
                .await
            {
                tracing::trace!(
                    segment_id = %self.segment_id,
                    span_id = span.span_id(),
                    "Span id not resolvable yet"
                );
                return Ok(Resolution::Pending);
            }

            for j in 0..span.refs_count() {
                let mut reference = span.reference(j);
                if !self
                    .service
                    .reference_exchanger()
                    .exchange(&mut reference, application_id)
                    .await
                {
                    tracing::trace!(
                        segment_id = %self.segment_id,
                        ref_index = j,
                        "Reference id not resolvable yet"
                    );
                    return Ok(Resolution::Pending);
                }
            }
        }

        Ok(Resolution::Resolved)
    }

    /// At most one entry span per segment. A violation is a producer bug and
    /// is never buffered, so it is checked before any exchange happens.
    fn check_entry_spans(&self, segment: &mut SegmentDecorator) -> Result<(), SegmentParseError> {
        let mut entry_span_count = 0;
        for i in 0..segment.spans_count() {
            if segment.span(i).span_type() == Some(SpanType::Entry) {
                entry_span_count += 1;
            }
            if entry_span_count > 1 {
                return Err(SegmentParseError::MultipleEntrySpans {
                    segment_id: self.segment_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Phase 2: route every span to the listeners for its role.
    fn dispatch(&mut self, segment: &mut SegmentDecorator) {
        let context = SegmentContext {
            application_id: segment.application_id(),
            application_instance_id: segment.application_instance_id(),
            segment_id: &self.segment_id,
        };

        for i in 0..segment.spans_count() {
            let mut span = segment.span(i);

            if span.span_id() == 0 {
                self.listeners.notify_first(&span, &context);
                self.time_bucket = minute_time_bucket(span.start_time());
                span.set_start_time_minute_time_bucket(self.time_bucket);
            }

            match span.span_type() {
                Some(SpanType::Exit) => self.listeners.notify_exit(&span, &context),
                Some(SpanType::Entry) => self.listeners.notify_entry(&span, &context),
                Some(SpanType::Local) => self.listeners.notify_local(&span, &context),
                None => {
                    tracing::error!(
                        segment_id = %self.segment_id,
                        span_id = span.span_id(),
                        span_type = span.span_type_value(),
                        "Unexpected span type, span skipped"
                    );
                }
            }
        }
    }

    fn write_to_buffer(&self, upstream: UpstreamSegment) {
        tracing::debug!(segment_id = %self.segment_id, "Pushing segment to buffer");
        self.service
            .buffer()
            .submit_for_buffering(BufferedSegment {
                id: self.segment_id.clone(),
                upstream,
            });
    }
}
