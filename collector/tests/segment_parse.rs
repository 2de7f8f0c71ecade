//! Parser behaviour against scripted exchangers, recording sinks and
//! recording listeners.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prost::Message;

use segment_collector::domain::segment::decorator::{ReferenceDecorator, SpanDecorator};
use segment_collector::domain::segment::exchange::{ReferenceIdExchanger, SpanIdExchanger};
use segment_collector::domain::segment::listener::{
    EntrySpanListener, ExitSpanListener, FirstSpanListener, GlobalTraceIdsListener,
    ListenerManager, LocalSpanListener, SegmentContext, SpanListener,
};
use segment_collector::domain::segment::proto::{
    SpanObject, SpanType, TraceSegmentObject, TraceSegmentReference, UniqueId, UpstreamSegment,
};
use segment_collector::domain::segment::sink::{
    BufferSink, BufferedSegment, PersistenceSink, Segment,
};
use segment_collector::domain::{SegmentParseError, SegmentParseService, Source};

// 2024-01-01T12:30:45Z
const START_TIME: i64 = 1_704_112_245_000;
const START_BUCKET: i64 = 202401011230;

// =============================================================================
// Test doubles
// =============================================================================

/// Answers from a script, then `true` once the script runs out.
#[derive(Default)]
struct ScriptedExchanger {
    script: Mutex<VecDeque<bool>>,
    calls: Mutex<usize>,
    resolved_id: i32,
}

impl ScriptedExchanger {
    fn resolving(resolved_id: i32) -> Self {
        Self {
            resolved_id,
            ..Default::default()
        }
    }

    fn failing_at(call: usize) -> Self {
        let mut script: VecDeque<bool> = std::iter::repeat_n(true, call).collect();
        script.push_back(false);
        Self {
            script: Mutex::new(script),
            ..Default::default()
        }
    }

    fn next(&self) -> bool {
        *self.calls.lock().unwrap() += 1;
        self.script.lock().unwrap().pop_front().unwrap_or(true)
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SpanIdExchanger for ScriptedExchanger {
    async fn exchange(&self, span: &mut SpanDecorator<'_>, _application_id: i32) -> bool {
        let resolved = self.next();
        if resolved && self.resolved_id != 0 {
            span.set_operation_name_id(self.resolved_id);
        }
        resolved
    }
}

#[async_trait]
impl ReferenceIdExchanger for ScriptedExchanger {
    async fn exchange(&self, reference: &mut ReferenceDecorator<'_>, _application_id: i32) -> bool {
        let resolved = self.next();
        if resolved && self.resolved_id != 0 {
            reference.set_parent_service_id(self.resolved_id);
        }
        resolved
    }
}

#[derive(Default)]
struct RecordingSinks {
    persisted: Mutex<Vec<Segment>>,
    buffered: Mutex<Vec<BufferedSegment>>,
}

impl RecordingSinks {
    fn persisted(&self) -> Vec<Segment> {
        self.persisted.lock().unwrap().clone()
    }

    fn buffered(&self) -> Vec<BufferedSegment> {
        self.buffered.lock().unwrap().clone()
    }
}

impl PersistenceSink for RecordingSinks {
    fn submit_for_persistence(&self, segment: Segment) {
        self.persisted.lock().unwrap().push(segment);
    }
}

impl BufferSink for RecordingSinks {
    fn submit_for_buffering(&self, buffered: BufferedSegment) {
        self.buffered.lock().unwrap().push(buffered);
    }
}

type Events = Arc<Mutex<Vec<String>>>;

/// Implements every role and logs each notification as `"<instance>:<event>"`.
struct RecordingListener {
    instance: usize,
    events: Events,
}

impl RecordingListener {
    fn record(&self, event: String) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.instance, event));
    }
}

impl SpanListener for RecordingListener {
    fn build(&mut self) {
        self.record("build".to_string());
    }

    fn as_global_trace_ids_listener(&mut self) -> Option<&mut dyn GlobalTraceIdsListener> {
        Some(self)
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

impl GlobalTraceIdsListener for RecordingListener {
    fn parse_global_trace_id(&mut self, global_trace_id: &UniqueId) {
        self.record(format!("global:{}", global_trace_id.to_dotted()));
    }
}

impl FirstSpanListener for RecordingListener {
    fn parse_first(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        self.record(format!("first:{}:{}", span.span_id(), context.segment_id));
    }
}

impl EntrySpanListener for RecordingListener {
    fn parse_entry(&mut self, span: &SpanDecorator<'_>, _context: &SegmentContext<'_>) {
        self.record(format!("entry:{}", span.span_id()));
    }
}

impl ExitSpanListener for RecordingListener {
    fn parse_exit(&mut self, span: &SpanDecorator<'_>, _context: &SegmentContext<'_>) {
        self.record(format!("exit:{}", span.span_id()));
    }
}

impl LocalSpanListener for RecordingListener {
    fn parse_local(&mut self, span: &SpanDecorator<'_>, _context: &SegmentContext<'_>) {
        self.record(format!("local:{}", span.span_id()));
    }
}

/// Implements no role; only ever sees `build`.
struct BuildOnlyListener {
    events: Events,
}

impl SpanListener for BuildOnlyListener {
    fn build(&mut self) {
        self.events.lock().unwrap().push("inert:build".to_string());
    }
}

// =============================================================================
// Fixture
// =============================================================================

struct Harness {
    service: SegmentParseService,
    sinks: Arc<RecordingSinks>,
    events: Events,
    instances: Arc<Mutex<usize>>,
}

impl Harness {
    fn new(spans: ScriptedExchanger, refs: ScriptedExchanger) -> (Self, Arc<ScriptedExchanger>, Arc<ScriptedExchanger>) {
        let events: Events = Arc::default();
        let instances = Arc::new(Mutex::new(0usize));
        let sinks = Arc::new(RecordingSinks::default());
        let spans = Arc::new(spans);
        let refs = Arc::new(refs);

        let mut manager = ListenerManager::new();
        let recording_events = events.clone();
        let counter = instances.clone();
        manager.add(Arc::new(move || {
            let mut count = counter.lock().unwrap();
            *count += 1;
            Box::new(RecordingListener {
                instance: *count,
                events: recording_events.clone(),
            }) as Box<dyn SpanListener>
        }));
        let inert_events = events.clone();
        manager.add(Arc::new(move || {
            Box::new(BuildOnlyListener {
                events: inert_events.clone(),
            }) as Box<dyn SpanListener>
        }));

        let service = SegmentParseService::new(
            Arc::new(manager),
            spans.clone(),
            refs.clone(),
            sinks.clone(),
            sinks.clone(),
        );

        (
            Self {
                service,
                sinks,
                events,
                instances,
            },
            spans,
            refs,
        )
    }

    fn resolving() -> Self {
        Self::new(ScriptedExchanger::default(), ScriptedExchanger::default()).0
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn instances(&self) -> usize {
        *self.instances.lock().unwrap()
    }
}

fn span(span_id: i32, kind: i32) -> SpanObject {
    SpanObject {
        span_id,
        parent_span_id: span_id - 1,
        span_type: kind,
        start_time: START_TIME + i64::from(span_id) * 60_000,
        end_time: START_TIME + i64::from(span_id) * 60_000 + 10,
        ..Default::default()
    }
}

fn segment(spans: Vec<SpanObject>) -> TraceSegmentObject {
    TraceSegmentObject {
        trace_segment_id: Some(UniqueId::new(vec![123, 456, 789])),
        application_id: 7,
        application_instance_id: 8,
        spans,
        ..Default::default()
    }
}

fn upstream(segment: &TraceSegmentObject) -> UpstreamSegment {
    UpstreamSegment {
        global_trace_ids: vec![UniqueId::new(vec![1, 1]), UniqueId::new(vec![2, 2])],
        segment: segment.encode_to_vec(),
    }
}

fn with_refs(mut span: SpanObject, count: usize) -> SpanObject {
    span.refs = (0..count)
        .map(|_| TraceSegmentReference {
            parent_service_name: "/parent".to_string(),
            ..Default::default()
        })
        .collect();
    span
}

// =============================================================================
// Success path
// =============================================================================

#[tokio::test]
async fn test_resolved_segment_is_persisted_once() {
    let (harness, _, _) = Harness::new(
        ScriptedExchanger::resolving(42),
        ScriptedExchanger::resolving(43),
    );
    let decoded = segment(vec![
        with_refs(span(0, SpanType::Entry as i32), 1),
        span(1, SpanType::Exit as i32),
    ]);

    let committed = harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap();

    assert!(committed);
    let persisted = harness.sinks.persisted();
    assert_eq!(persisted.len(), 1);
    assert!(harness.sinks.buffered().is_empty());

    let record = &persisted[0];
    assert_eq!(record.id, "123.456.789");
    assert_eq!(record.time_bucket, START_BUCKET);

    // Payload is the re-encoded, exchange-mutated segment
    let stored = TraceSegmentObject::decode(record.data_binary.as_slice()).unwrap();
    assert!(stored.spans.iter().all(|s| s.operation_name_id == 42));
    assert_eq!(stored.spans[0].refs[0].parent_service_id, 43);
    assert!(stored.spans[0].refs[0].parent_service_name.is_empty());
}

#[tokio::test]
async fn test_segment_without_entry_span_is_committed() {
    let harness = Harness::resolving();
    let decoded = segment(vec![span(0, SpanType::Local as i32), span(1, SpanType::Exit as i32)]);

    assert!(
        harness
            .service
            .parse(upstream(&decoded), Source::Agent)
            .await
            .unwrap()
    );
    assert_eq!(harness.sinks.persisted().len(), 1);
}

#[tokio::test]
async fn test_listener_notification_order() {
    let harness = Harness::resolving();
    let decoded = segment(vec![
        span(0, SpanType::Entry as i32),
        span(1, SpanType::Local as i32),
        span(2, SpanType::Exit as i32),
    ]);

    harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap();

    assert_eq!(
        harness.events(),
        vec![
            "1:global:1.1",
            "1:global:2.2",
            "1:first:0:123.456.789",
            "1:entry:0",
            "1:local:1",
            "1:exit:2",
            "1:build",
            "inert:build",
        ]
    );
}

#[tokio::test]
async fn test_first_span_bucket_wins_regardless_of_position() {
    let harness = Harness::resolving();
    // First span listed last; its start time is two minutes in
    let mut first = span(0, SpanType::Entry as i32);
    first.start_time = START_TIME + 120_000;
    let decoded = segment(vec![span(1, SpanType::Exit as i32), first]);

    harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap();

    assert_eq!(harness.sinks.persisted()[0].time_bucket, START_BUCKET + 2);
}

#[tokio::test]
async fn test_unknown_span_type_is_skipped() {
    let harness = Harness::resolving();
    let decoded = segment(vec![span(0, SpanType::Entry as i32), span(1, 99)]);

    let committed = harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap();

    assert!(committed);
    let events = harness.events();
    assert!(!events.iter().any(|e| e.ends_with(":1") && !e.contains("global")));
    assert!(events.contains(&"1:build".to_string()));
}

#[tokio::test]
async fn test_listener_instances_are_per_call() {
    let harness = Harness::resolving();
    let decoded = segment(vec![span(0, SpanType::Entry as i32)]);

    for _ in 0..3 {
        harness
            .service
            .parse(upstream(&decoded), Source::Agent)
            .await
            .unwrap();
    }

    assert_eq!(harness.instances(), 3);
    let builds = harness
        .events()
        .into_iter()
        .filter(|e| e.ends_with(":build"))
        .count();
    assert_eq!(builds, 6);
}

// =============================================================================
// Resolution pending
// =============================================================================

#[tokio::test]
async fn test_span_exchange_failure_buffers_agent_submission() {
    let (harness, spans, refs) = Harness::new(
        ScriptedExchanger::failing_at(1),
        ScriptedExchanger::default(),
    );
    let decoded = segment(vec![
        span(0, SpanType::Entry as i32),
        span(1, SpanType::Exit as i32),
        span(2, SpanType::Exit as i32),
    ]);
    let original = upstream(&decoded);

    let committed = harness
        .service
        .parse(original.clone(), Source::Agent)
        .await
        .unwrap();

    assert!(!committed);
    assert!(harness.sinks.persisted().is_empty());
    assert_eq!(
        harness.sinks.buffered(),
        vec![BufferedSegment {
            id: "123.456.789".to_string(),
            upstream: original,
        }]
    );
    // Aborted at the second span
    assert_eq!(spans.calls(), 2);
    assert_eq!(refs.calls(), 0);
}

#[tokio::test]
async fn test_reference_exchange_failure_buffers_agent_submission() {
    let (harness, spans, refs) = Harness::new(
        ScriptedExchanger::default(),
        ScriptedExchanger::failing_at(0),
    );
    let decoded = segment(vec![
        with_refs(span(0, SpanType::Entry as i32), 2),
        span(1, SpanType::Exit as i32),
    ]);
    let original = upstream(&decoded);

    let committed = harness
        .service
        .parse(original.clone(), Source::Agent)
        .await
        .unwrap();

    assert!(!committed);
    assert!(harness.sinks.persisted().is_empty());
    assert_eq!(
        harness.sinks.buffered(),
        vec![BufferedSegment {
            id: "123.456.789".to_string(),
            upstream: original,
        }]
    );
    // Aborted at the first reference of the first span
    assert_eq!(spans.calls(), 1);
    assert_eq!(refs.calls(), 1);
}

#[tokio::test]
async fn test_reference_exchange_failure_is_not_rebuffered_on_replay() {
    let (harness, _, refs) = Harness::new(
        ScriptedExchanger::default(),
        ScriptedExchanger::failing_at(0),
    );
    let decoded = segment(vec![with_refs(span(0, SpanType::Entry as i32), 2)]);

    let committed = harness
        .service
        .parse(upstream(&decoded), Source::Buffer)
        .await
        .unwrap();

    assert!(!committed);
    assert!(harness.sinks.buffered().is_empty());
    assert!(harness.sinks.persisted().is_empty());
    assert_eq!(refs.calls(), 1);
}

#[tokio::test]
async fn test_global_trace_ids_notified_even_when_pending() {
    let (harness, _, _) = Harness::new(
        ScriptedExchanger::failing_at(0),
        ScriptedExchanger::default(),
    );
    let decoded = segment(vec![span(0, SpanType::Entry as i32)]);

    harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap();

    // Only the global trace ids; no span notification and no build
    assert_eq!(harness.events(), vec!["1:global:1.1", "1:global:2.2"]);
}

// =============================================================================
// Structural violation
// =============================================================================

#[tokio::test]
async fn test_multiple_entry_spans_fail_before_span_listeners() {
    let (harness, spans, _) = Harness::new(
        ScriptedExchanger::failing_at(0),
        ScriptedExchanger::default(),
    );
    let decoded = segment(vec![
        span(0, SpanType::Entry as i32),
        span(1, SpanType::Exit as i32),
        span(2, SpanType::Entry as i32),
    ]);

    let err = harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SegmentParseError::MultipleEntrySpans { ref segment_id } if segment_id == "123.456.789"
    ));
    assert!(harness.sinks.buffered().is_empty());
    assert!(harness.sinks.persisted().is_empty());
    assert_eq!(spans.calls(), 0);
    assert!(
        harness
            .events()
            .iter()
            .all(|e| e.starts_with("1:global:"))
    );
}

// =============================================================================
// Decode failure
// =============================================================================

#[tokio::test]
async fn test_malformed_segment_is_dropped() {
    let harness = Harness::resolving();
    let wire = UpstreamSegment {
        global_trace_ids: vec![UniqueId::new(vec![1])],
        segment: vec![0xff, 0xff, 0xff, 0xff],
    };

    let committed = harness.service.parse(wire, Source::Agent).await.unwrap();

    assert!(!committed);
    assert!(harness.sinks.persisted().is_empty());
    assert!(harness.sinks.buffered().is_empty());
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_single_part_segment_id() {
    let harness = Harness::resolving();
    let mut decoded = segment(vec![span(0, SpanType::Entry as i32)]);
    decoded.trace_segment_id = Some(UniqueId::new(vec![42]));

    harness
        .service
        .parse(upstream(&decoded), Source::Agent)
        .await
        .unwrap();

    assert_eq!(harness.sinks.persisted()[0].id, "42");
}
