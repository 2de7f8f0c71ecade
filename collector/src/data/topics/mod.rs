//! In-process topics
//!
//! Named, typed fan-out channels used as the entry points of the downstream
//! segment pipelines (persistence and buffer). Publishing never blocks: each
//! topic has a byte budget and a bounded channel, and a publish that would
//! exceed either fails immediately with [`TopicError::BufferFull`] or
//! [`TopicError::ChannelClosed`].
//!
//! A dispatcher task per topic moves messages from the bounded channel to a
//! broadcast channel every subscriber reads from. Subscribers that fall
//! behind observe [`TopicError::Lagged`].

mod error;
mod sinks;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

pub use error::TopicError;

use crate::core::config::PipelineConfig;

// ============================================================================
// TOPIC MESSAGE TRAIT
// ============================================================================

/// Trait for messages that can be published to topics
pub trait TopicMessage: Clone + Send + Sync + 'static {
    /// Estimate message size in bytes for backpressure
    fn size_bytes(&self) -> usize;
}

// ============================================================================
// TOPIC CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Byte budget of messages published but not yet dispatched
    pub buffer_size: usize,
    /// Capacity of both the bounded and the broadcast channel
    pub channel_capacity: usize,
}

impl From<&PipelineConfig> for TopicConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            channel_capacity: config.channel_capacity,
        }
    }
}

// ============================================================================
// PUBLISHER / SUBSCRIBER
// ============================================================================

/// Publisher handle - clone and share across producers
#[derive(Clone, Debug)]
pub struct Publisher<T: TopicMessage> {
    topic: Arc<str>,
    tx: mpsc::Sender<T>,
    buffer_bytes: Arc<AtomicUsize>,
    max_bytes: usize,
}

impl<T: TopicMessage> Publisher<T> {
    /// Publish message (returns error if buffer full)
    pub fn publish(&self, msg: T) -> Result<(), TopicError> {
        let msg_size = msg.size_bytes();

        // Reserve buffer space before handing the message over
        loop {
            let current = self.buffer_bytes.load(Ordering::Relaxed);
            if current + msg_size > self.max_bytes {
                return Err(TopicError::BufferFull);
            }
            if self
                .buffer_bytes
                .compare_exchange(
                    current,
                    current + msg_size,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }

        self.tx.try_send(msg).map_err(|e| {
            self.buffer_bytes.fetch_sub(msg_size, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(_) => TopicError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => TopicError::ChannelClosed,
            }
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Subscriber handle
pub struct Subscriber<T: TopicMessage> {
    rx: broadcast::Receiver<T>,
}

impl<T: TopicMessage> Subscriber<T> {
    pub async fn recv(&mut self) -> Result<T, TopicError> {
        self.rx.recv().await.map_err(|e| e.into())
    }
}

// ============================================================================
// TOPIC HANDLE
// ============================================================================

/// Handle to a specific topic
#[derive(Clone)]
pub struct Topic<T: TopicMessage> {
    name: String,
    publisher: Publisher<T>,
    broadcast_tx: broadcast::Sender<T>,
}

impl<T: TopicMessage> Topic<T> {
    pub fn publisher(&self) -> Publisher<T> {
        self.publisher.clone()
    }

    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber {
            rx: self.broadcast_tx.subscribe(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// TOPIC SERVICE
// ============================================================================

struct TopicInner<T: TopicMessage> {
    broadcast_tx: broadcast::Sender<T>,
    publisher: Publisher<T>,
}

/// Type-erased topic storage
trait AnyTopic: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: TopicMessage> AnyTopic for TopicInner<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

type TopicMap = HashMap<String, (TypeId, Arc<dyn AnyTopic>)>;

struct DispatcherEntry {
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Registry of all topics of the process
pub struct TopicService {
    topics: RwLock<TopicMap>,
    dispatchers: RwLock<Vec<DispatcherEntry>>,
    config: TopicConfig,
}

impl TopicService {
    pub fn new(config: TopicConfig) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            dispatchers: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Create a topic or get the existing one with the same name
    pub fn topic<T: TopicMessage>(&self, name: &str) -> Result<Topic<T>, TopicError> {
        let type_id = TypeId::of::<T>();

        // Hold write lock so concurrent creators agree on a single instance
        let mut topics = self.topics.write();

        if let Some((existing_type, topic)) = topics.get(name) {
            let inner = (*existing_type == type_id)
                .then(|| topic.as_any().downcast_ref::<TopicInner<T>>())
                .flatten()
                .ok_or_else(|| TopicError::TypeMismatch(name.to_string()))?;
            return Ok(Topic {
                name: name.to_string(),
                publisher: inner.publisher.clone(),
                broadcast_tx: inner.broadcast_tx.clone(),
            });
        }

        let (mpsc_tx, mpsc_rx) = mpsc::channel(self.config.channel_capacity);
        let (broadcast_tx, _) = broadcast::channel(self.config.channel_capacity);
        let buffer_bytes = Arc::new(AtomicUsize::new(0));

        let publisher = Publisher {
            topic: Arc::from(name),
            tx: mpsc_tx,
            buffer_bytes: buffer_bytes.clone(),
            max_bytes: self.config.buffer_size,
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = Self::start_dispatcher(
            name.to_string(),
            mpsc_rx,
            broadcast_tx.clone(),
            buffer_bytes,
            shutdown_rx,
        );
        self.dispatchers.write().push(DispatcherEntry {
            handle,
            shutdown_tx,
        });

        let inner = TopicInner {
            broadcast_tx: broadcast_tx.clone(),
            publisher: publisher.clone(),
        };
        topics.insert(name.to_string(), (type_id, Arc::new(inner)));

        tracing::debug!(topic = name, "Topic created");

        Ok(Topic {
            name: name.to_string(),
            publisher,
            broadcast_tx,
        })
    }

    fn start_dispatcher<T: TopicMessage>(
        name: String,
        mut rx: mpsc::Receiver<T>,
        broadcast_tx: broadcast::Sender<T>,
        buffer_bytes: Arc<AtomicUsize>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let dispatch = |msg: T| {
                let msg_size = msg.size_bytes();
                if broadcast_tx.send(msg).is_err() {
                    tracing::warn!(topic = %name, "No subscribers, message dropped");
                }
                buffer_bytes.fetch_sub(msg_size, Ordering::SeqCst);
            };

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        // Drain remaining messages before exiting
                        while let Ok(msg) = rx.try_recv() {
                            dispatch(msg);
                        }
                        break;
                    }
                    msg = rx.recv() => {
                        match msg {
                            Some(msg) => dispatch(msg),
                            None => break,
                        }
                    }
                }
            }
        })
    }

    /// Stop all dispatchers after draining what was already published
    pub async fn shutdown(&self) {
        let entries: Vec<_> = {
            let mut guard = self.dispatchers.write();
            std::mem::take(&mut *guard)
        };

        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            let _ = entry.shutdown_tx.send(());
            handles.push(entry.handle);
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
