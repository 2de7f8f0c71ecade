//! Buffer replay pipeline
//!
//! Consumes segments whose identifiers could not be resolved and, after a
//! delay, runs them through the parser again as [`Source::Buffer`]. A replay
//! is never buffered again; instead it is attempted up to
//! [`REPLAY_MAX_ATTEMPTS`] times, `replay_delay` apart, and then dropped.
//!
//! At most `max_in_flight` replays are pending at once. While the limit is
//! reached the pipeline stops reading the buffer topic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::data::topics::{Topic, TopicError};
use crate::domain::segment::sink::BufferedSegment;
use crate::domain::segment::{SegmentParseError, SegmentParseService, Source};

/// Parse attempts per buffered segment
pub const REPLAY_MAX_ATTEMPTS: u32 = 3;

/// Default cap on concurrently pending replays
pub const MAX_IN_FLIGHT_REPLAYS: usize = 1024;

/// Result of a single replay, keyed by segment id.
type ReplayOutcome = (String, Result<bool, SegmentParseError>);

pub struct BufferReplayPipeline {
    parser: Arc<SegmentParseService>,
    replay_delay: Duration,
    max_in_flight: usize,
}

impl BufferReplayPipeline {
    pub fn new(parser: Arc<SegmentParseService>, replay_delay: Duration) -> Self {
        Self {
            parser,
            replay_delay,
            max_in_flight: MAX_IN_FLIGHT_REPLAYS,
        }
    }

    #[cfg(test)]
    fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Start the replay loop. Replays still pending when shutdown is
    /// requested are aborted.
    pub fn start(
        self,
        topic: Topic<BufferedSegment>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut subscriber = topic.subscribe();

        tokio::spawn(async move {
            tracing::debug!(
                topic = topic.name(),
                delay_ms = self.replay_delay.as_millis() as u64,
                max_in_flight = self.max_in_flight,
                "BufferReplayPipeline started"
            );

            let mut replays: JoinSet<ReplayOutcome> = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    Some(joined) = replays.join_next(), if !replays.is_empty() => {
                        match joined {
                            Ok(outcome) => log_outcome(outcome),
                            Err(e) => tracing::error!(error = %e, "Buffer replay task failed"),
                        }
                    }
                    result = subscriber.recv(), if replays.len() < self.max_in_flight => {
                        match result {
                            Ok(buffered) => self.schedule(&mut replays, buffered),
                            Err(TopicError::Lagged(n)) => {
                                tracing::warn!(lagged = n, "BufferReplayPipeline lagged, segments lost");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "BufferReplayPipeline receive error");
                                break;
                            }
                        }
                    }
                }
            }

            if !replays.is_empty() {
                tracing::warn!(count = replays.len(), "Aborting pending buffer replays");
            }
            replays.shutdown().await;
            tracing::debug!("BufferReplayPipeline shutdown complete");
        })
    }

    fn schedule(&self, replays: &mut JoinSet<ReplayOutcome>, buffered: BufferedSegment) {
        let parser = Arc::clone(&self.parser);
        let delay = self.replay_delay;
        tracing::debug!(segment_id = %buffered.id, "Scheduling buffered segment replay");

        replays.spawn(async move {
            let mut attempt = 1;
            loop {
                tokio::time::sleep(delay).await;
                let result = parser.parse(buffered.upstream.clone(), Source::Buffer).await;
                match result {
                    Ok(false) if attempt < REPLAY_MAX_ATTEMPTS => {
                        tracing::debug!(
                            segment_id = %buffered.id,
                            attempt,
                            "Buffered segment still unresolved, retrying"
                        );
                        attempt += 1;
                    }
                    _ => return (buffered.id, result),
                }
            }
        });
    }
}

fn log_outcome((segment_id, result): ReplayOutcome) {
    match result {
        Ok(true) => tracing::debug!(segment_id = %segment_id, "Buffered segment replayed"),
        Ok(false) => tracing::warn!(
            segment_id = %segment_id,
            attempts = REPLAY_MAX_ATTEMPTS,
            "Buffered segment still unresolved, dropped"
        ),
        Err(e) => tracing::error!(segment_id = %segment_id, error = %e, "Buffered segment rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use prost::Message;
    use tokio::sync::Semaphore;

    use crate::data::topics::{TopicConfig, TopicService};
    use crate::domain::segment::decorator::{ReferenceDecorator, SpanDecorator};
    use crate::domain::segment::exchange::{ReferenceIdExchanger, SpanIdExchanger};
    use crate::domain::segment::listener::ListenerManager;
    use crate::domain::segment::proto::{
        SpanObject, SpanType, TraceSegmentObject, UniqueId, UpstreamSegment,
    };
    use crate::domain::segment::sink::{BufferSink, PersistenceSink, Segment};

    /// Fails the first `failures` span exchanges, then waits for a permit
    /// on every call while tracking how many calls overlap.
    struct GatedExchanger {
        failures: AtomicUsize,
        gate: Semaphore,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl GatedExchanger {
        fn new(failures: usize, permits: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                gate: Semaphore::new(permits),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpanIdExchanger for GatedExchanger {
        async fn exchange(&self, _span: &mut SpanDecorator<'_>, _application_id: i32) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);

            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        }
    }

    #[async_trait]
    impl ReferenceIdExchanger for GatedExchanger {
        async fn exchange(
            &self,
            _reference: &mut ReferenceDecorator<'_>,
            _application_id: i32,
        ) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct RecordingSinks {
        persisted: Mutex<Vec<Segment>>,
        buffered: Mutex<Vec<BufferedSegment>>,
    }

    impl PersistenceSink for RecordingSinks {
        fn submit_for_persistence(&self, segment: Segment) {
            self.persisted.lock().push(segment);
        }
    }

    impl BufferSink for RecordingSinks {
        fn submit_for_buffering(&self, buffered: BufferedSegment) {
            self.buffered.lock().push(buffered);
        }
    }

    fn buffered(id: i64) -> BufferedSegment {
        let segment = TraceSegmentObject {
            trace_segment_id: Some(UniqueId::new(vec![id])),
            spans: vec![SpanObject {
                span_type: SpanType::Entry as i32,
                ..Default::default()
            }],
            ..Default::default()
        };
        BufferedSegment {
            id: id.to_string(),
            upstream: UpstreamSegment {
                global_trace_ids: Vec::new(),
                segment: segment.encode_to_vec(),
            },
        }
    }

    fn setup(
        exchanger: Arc<GatedExchanger>,
    ) -> (Arc<SegmentParseService>, Arc<RecordingSinks>, TopicService) {
        let sinks = Arc::new(RecordingSinks::default());
        let parser = Arc::new(SegmentParseService::new(
            Arc::new(ListenerManager::new()),
            exchanger.clone(),
            exchanger,
            sinks.clone(),
            sinks.clone(),
        ));
        let topics = TopicService::new(TopicConfig {
            buffer_size: 1024 * 1024,
            channel_capacity: 64,
        });
        (parser, sinks, topics)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_replay_retries_until_resolved() {
        let exchanger = Arc::new(GatedExchanger::new(2, 100));
        let (parser, sinks, topics) = setup(exchanger.clone());
        let topic = topics.topic::<BufferedSegment>("buffer").unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = BufferReplayPipeline::new(parser, Duration::from_millis(5))
            .start(topic.clone(), shutdown_rx);
        topic.publisher().publish(buffered(7)).unwrap();

        wait_until(|| !sinks.persisted.lock().is_empty()).await;
        assert_eq!(sinks.persisted.lock()[0].id, "7");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 3);
        // A replay never goes back to the buffer
        assert!(sinks.buffered.lock().is_empty());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        topics.shutdown().await;
    }

    #[tokio::test]
    async fn test_replay_gives_up_after_max_attempts() {
        let exchanger = Arc::new(GatedExchanger::new(usize::MAX, 100));
        let (parser, sinks, topics) = setup(exchanger.clone());
        let topic = topics.topic::<BufferedSegment>("buffer").unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = BufferReplayPipeline::new(parser, Duration::from_millis(5))
            .start(topic.clone(), shutdown_rx);
        topic.publisher().publish(buffered(7)).unwrap();

        wait_until(|| exchanger.calls.load(Ordering::SeqCst) >= REPLAY_MAX_ATTEMPTS as usize)
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            exchanger.calls.load(Ordering::SeqCst),
            REPLAY_MAX_ATTEMPTS as usize
        );
        assert!(sinks.persisted.lock().is_empty());
        assert!(sinks.buffered.lock().is_empty());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        topics.shutdown().await;
    }

    #[tokio::test]
    async fn test_in_flight_replays_are_capped() {
        let exchanger = Arc::new(GatedExchanger::new(0, 0));
        let (parser, sinks, topics) = setup(exchanger.clone());
        let topic = topics.topic::<BufferedSegment>("buffer").unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = BufferReplayPipeline::new(parser, Duration::ZERO)
            .with_max_in_flight(2)
            .start(topic.clone(), shutdown_rx);
        for id in 1..=5 {
            topic.publisher().publish(buffered(id)).unwrap();
        }

        wait_until(|| exchanger.active.load(Ordering::SeqCst) == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 2);

        exchanger.gate.add_permits(5);
        wait_until(|| sinks.persisted.lock().len() == 5).await;
        assert_eq!(exchanger.peak.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        topics.shutdown().await;
    }
}
