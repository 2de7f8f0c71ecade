//! In-memory inventory register
//!
//! Maps operation names, network addresses and component names to integer
//! ids. Lookups never block: an unknown name is queued for registration and
//! reported as unresolved (`0`); the register worker assigns ids to queued
//! names on its next tick, so a later lookup succeeds.

mod exchange;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use exchange::{RegisterReferenceIdExchanger, RegisterSpanIdExchanger};

/// Id reported for names that are not registered yet.
pub const UNRESOLVED_ID: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RegisterKey {
    OperationName { application_id: i32, name: String },
    NetworkAddress(String),
    Component(String),
}

#[derive(Default)]
pub struct RegisterService {
    operation_names: DashMap<(i32, String), i32>,
    network_addresses: DashMap<String, i32>,
    components: DashMap<String, i32>,
    pending: Mutex<HashSet<RegisterKey>>,
    next_operation_id: AtomicI32,
    next_address_id: AtomicI32,
    next_component_id: AtomicI32,
}

impl RegisterService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_operation_name(&self, application_id: i32, name: &str) -> i32 {
        if let Some(id) = self.operation_names.get(&(application_id, name.to_string())) {
            return *id;
        }
        self.request(RegisterKey::OperationName {
            application_id,
            name: name.to_string(),
        })
    }

    pub fn get_or_create_network_address(&self, address: &str) -> i32 {
        if let Some(id) = self.network_addresses.get(address) {
            return *id;
        }
        self.request(RegisterKey::NetworkAddress(address.to_string()))
    }

    pub fn get_or_create_component(&self, component: &str) -> i32 {
        if let Some(id) = self.components.get(component) {
            return *id;
        }
        self.request(RegisterKey::Component(component.to_string()))
    }

    /// Number of names waiting for an id.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Assign ids to every queued name. Returns how many were processed.
    pub fn process_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();

        for key in pending {
            match key {
                RegisterKey::OperationName {
                    application_id,
                    name,
                } => {
                    let id = *self
                        .operation_names
                        .entry((application_id, name.clone()))
                        .or_insert_with(|| next_id(&self.next_operation_id));
                    tracing::trace!(application_id, name = %name, id, "Registered operation name");
                }
                RegisterKey::NetworkAddress(address) => {
                    let id = *self
                        .network_addresses
                        .entry(address.clone())
                        .or_insert_with(|| next_id(&self.next_address_id));
                    tracing::trace!(address = %address, id, "Registered network address");
                }
                RegisterKey::Component(component) => {
                    let id = *self
                        .components
                        .entry(component.clone())
                        .or_insert_with(|| next_id(&self.next_component_id));
                    tracing::trace!(component = %component, id, "Registered component");
                }
            }
        }

        count
    }

    /// Start the background register worker.
    pub fn start_worker(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::debug!(interval_ms = interval.as_millis() as u64, "Register worker started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let count = self.process_pending();
                        if count > 0 {
                            tracing::debug!(count, "Registered pending inventory names");
                        }
                    }
                }
            }

            tracing::debug!("Register worker shutdown complete");
        })
    }

    fn request(&self, key: RegisterKey) -> i32 {
        if self.pending.lock().insert(key.clone()) {
            tracing::trace!(key = ?key, "Queued inventory registration");
        }
        UNRESOLVED_ID
    }
}

/// Ids start at 1 so that 0 keeps meaning "unresolved".
fn next_id(counter: &AtomicI32) -> i32 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}
