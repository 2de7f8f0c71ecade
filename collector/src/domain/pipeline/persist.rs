//! Segment persistence pipeline
//!
//! Consumes committed segments from the persistence topic and writes them to
//! the segment store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::data::store::SegmentStore;
use crate::data::topics::{Topic, TopicError};
use crate::domain::segment::sink::Segment;

/// How long to wait for more messages while draining on shutdown
const DRAIN_TIMEOUT_MS: u64 = 100;

pub struct SegmentPersistPipeline {
    store: Arc<SegmentStore>,
}

impl SegmentPersistPipeline {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self { store }
    }

    pub fn start(self, topic: Topic<Segment>, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut subscriber = topic.subscribe();

        tokio::spawn(async move {
            tracing::debug!(topic = topic.name(), "SegmentPersistPipeline started");

            let mut shutdown_requested = false;

            loop {
                if shutdown_requested {
                    match tokio::time::timeout(
                        Duration::from_millis(DRAIN_TIMEOUT_MS),
                        subscriber.recv(),
                    )
                    .await
                    {
                        Ok(Ok(segment)) => {
                            self.persist(segment);
                            continue;
                        }
                        Ok(Err(TopicError::Lagged(n))) => {
                            tracing::warn!(lagged = n, "SegmentPersistPipeline lagged during drain");
                            continue;
                        }
                        _ => break,
                    }
                }

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("SegmentPersistPipeline received shutdown, draining...");
                            shutdown_requested = true;
                        }
                    }
                    result = subscriber.recv() => {
                        match result {
                            Ok(segment) => self.persist(segment),
                            Err(TopicError::Lagged(n)) => {
                                tracing::warn!(lagged = n, "SegmentPersistPipeline lagged, segments lost");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "SegmentPersistPipeline receive error");
                                break;
                            }
                        }
                    }
                }
            }

            tracing::debug!("SegmentPersistPipeline shutdown complete");
        })
    }

    fn persist(&self, segment: Segment) {
        tracing::trace!(
            segment_id = %segment.id,
            time_bucket = segment.time_bucket,
            bytes = segment.data_binary.len(),
            "Persisting segment"
        );
        self.store.insert_segment(segment);
    }
}
