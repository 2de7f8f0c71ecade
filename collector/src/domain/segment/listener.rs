//! Span listeners and per-call listener dispatch
//!
//! A listener implements [`SpanListener`] plus any subset of the role traits
//! ([`GlobalTraceIdsListener`], [`FirstSpanListener`], [`EntrySpanListener`],
//! [`ExitSpanListener`], [`LocalSpanListener`]) and advertises them through the
//! `as_*` accessors. Roles are probed once when an instance joins a
//! [`SpanListeners`] set and cached as [`Capabilities`].
//!
//! Listener instances are call-scoped: every parse builds a fresh set from
//! the shared [`ListenerManager`] and consumes it with [`SpanListeners::build`].

use std::sync::Arc;

use super::decorator::SpanDecorator;
use super::proto::UniqueId;

/// Segment-level values passed alongside every span notification.
#[derive(Debug, Clone, Copy)]
pub struct SegmentContext<'a> {
    pub application_id: i32,
    pub application_instance_id: i32,
    pub segment_id: &'a str,
}

// ============================================================================
// LISTENER TRAITS
// ============================================================================

pub trait SpanListener: Send {
    /// Called exactly once per successful parse, after every span
    /// notification of that parse.
    fn build(&mut self);

    fn as_global_trace_ids_listener(&mut self) -> Option<&mut dyn GlobalTraceIdsListener> {
        None
    }

    fn as_first_span_listener(&mut self) -> Option<&mut dyn FirstSpanListener> {
        None
    }

    fn as_entry_span_listener(&mut self) -> Option<&mut dyn EntrySpanListener> {
        None
    }

    fn as_exit_span_listener(&mut self) -> Option<&mut dyn ExitSpanListener> {
        None
    }

    fn as_local_span_listener(&mut self) -> Option<&mut dyn LocalSpanListener> {
        None
    }
}

pub trait GlobalTraceIdsListener: SpanListener {
    fn parse_global_trace_id(&mut self, global_trace_id: &UniqueId);
}

pub trait FirstSpanListener: SpanListener {
    fn parse_first(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>);
}

pub trait EntrySpanListener: SpanListener {
    fn parse_entry(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>);
}

pub trait ExitSpanListener: SpanListener {
    fn parse_exit(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>);
}

pub trait LocalSpanListener: SpanListener {
    fn parse_local(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>);
}

// ============================================================================
// CAPABILITIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    GlobalTraceId,
    First,
    Entry,
    Exit,
    Local,
}

impl ListenerRole {
    pub const ALL: [ListenerRole; 5] = [
        ListenerRole::GlobalTraceId,
        ListenerRole::First,
        ListenerRole::Entry,
        ListenerRole::Exit,
        ListenerRole::Local,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of roles a listener instance satisfies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    /// Probe every role accessor of `listener` once.
    pub fn probe(listener: &mut dyn SpanListener) -> Self {
        let mut caps = Capabilities::default();
        for role in ListenerRole::ALL {
            let supported = match role {
                ListenerRole::GlobalTraceId => listener.as_global_trace_ids_listener().is_some(),
                ListenerRole::First => listener.as_first_span_listener().is_some(),
                ListenerRole::Entry => listener.as_entry_span_listener().is_some(),
                ListenerRole::Exit => listener.as_exit_span_listener().is_some(),
                ListenerRole::Local => listener.as_local_span_listener().is_some(),
            };
            if supported {
                caps.0 |= role.bit();
            }
        }
        caps
    }

    pub fn contains(&self, role: ListenerRole) -> bool {
        self.0 & role.bit() != 0
    }
}

// ============================================================================
// FACTORIES
// ============================================================================

/// Process-wide producer of fresh listener instances.
pub trait SpanListenerFactory: Send + Sync {
    fn create(&self) -> Box<dyn SpanListener>;
}

impl<F> SpanListenerFactory for F
where
    F: Fn() -> Box<dyn SpanListener> + Send + Sync,
{
    fn create(&self) -> Box<dyn SpanListener> {
        self()
    }
}

/// Registry of listener factories, populated at startup and shared read-only.
#[derive(Default, Clone)]
pub struct ListenerManager {
    factories: Vec<Arc<dyn SpanListenerFactory>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, factory: Arc<dyn SpanListenerFactory>) {
        self.factories.push(factory);
    }

    pub fn factories(&self) -> &[Arc<dyn SpanListenerFactory>] {
        &self.factories
    }
}

// ============================================================================
// PER-CALL LISTENER SET
// ============================================================================

struct ListenerSlot {
    capabilities: Capabilities,
    listener: Box<dyn SpanListener>,
}

/// Listener instances owned by a single parse call.
pub struct SpanListeners {
    slots: Vec<ListenerSlot>,
}

impl SpanListeners {
    /// Instantiate one listener per registered factory.
    pub fn create(manager: &ListenerManager) -> Self {
        let slots = manager
            .factories()
            .iter()
            .map(|factory| {
                let mut listener = factory.create();
                let capabilities = Capabilities::probe(listener.as_mut());
                ListenerSlot {
                    capabilities,
                    listener,
                }
            })
            .collect();
        Self { slots }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of instances satisfying `role`.
    #[cfg(test)]
    fn count_with(&self, role: ListenerRole) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.capabilities.contains(role))
            .count()
    }

    pub fn notify_global_trace_id(&mut self, global_trace_id: &UniqueId) {
        for slot in self.with_role(ListenerRole::GlobalTraceId) {
            if let Some(listener) = slot.listener.as_global_trace_ids_listener() {
                listener.parse_global_trace_id(global_trace_id);
            }
        }
    }

    pub fn notify_first(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        for slot in self.with_role(ListenerRole::First) {
            if let Some(listener) = slot.listener.as_first_span_listener() {
                listener.parse_first(span, context);
            }
        }
    }

    pub fn notify_entry(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        for slot in self.with_role(ListenerRole::Entry) {
            if let Some(listener) = slot.listener.as_entry_span_listener() {
                listener.parse_entry(span, context);
            }
        }
    }

    pub fn notify_exit(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        for slot in self.with_role(ListenerRole::Exit) {
            if let Some(listener) = slot.listener.as_exit_span_listener() {
                listener.parse_exit(span, context);
            }
        }
    }

    pub fn notify_local(&mut self, span: &SpanDecorator<'_>, context: &SegmentContext<'_>) {
        for slot in self.with_role(ListenerRole::Local) {
            if let Some(listener) = slot.listener.as_local_span_listener() {
                listener.parse_local(span, context);
            }
        }
    }

    /// Flush every instance exactly once. Consumes the set so it cannot be
    /// notified or flushed again.
    pub fn build(self) {
        for mut slot in self.slots {
            slot.listener.build();
        }
    }

    fn with_role(&mut self, role: ListenerRole) -> impl Iterator<Item = &mut ListenerSlot> {
        self.slots
            .iter_mut()
            .filter(move |slot| slot.capabilities.contains(role))
    }
}
