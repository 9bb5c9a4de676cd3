//! Listener registries and asynchronous fan-out
//!
//! Producers hand events to [`Listeners`] and return immediately. A single
//! dispatch task drains the handoff channel in order and calls every
//! registered listener, so a slow listener delays other listeners but never
//! the transmit worker or the inbound dispatcher.
//!
//! The registry lock is released before any callback runs; listeners may
//! add or remove listeners (including themselves) from inside a callback.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use x10_core::{
    route_event, route_transmitter_event, TransmitterEvent, TransmitterListener, X10Event,
    X10Listener,
};

/// Handle returned when registering a listener, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

enum Dispatch {
    Events(Vec<X10Event>),
    Transmitter(TransmitterEvent),
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    x10: RwLock<Vec<(ListenerId, Arc<dyn X10Listener>)>>,
    transmitter: RwLock<Vec<(ListenerId, Arc<dyn TransmitterListener>)>>,
}

impl Registry {
    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn deliver(&self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Events(events) => {
                let listeners: Vec<_> =
                    self.x10.read().iter().map(|(_, l)| l.clone()).collect();
                for event in &events {
                    trace!(%event, listeners = listeners.len(), "Dispatching X10 event");
                    for listener in &listeners {
                        guard_callback(|| route_event(listener.as_ref(), event));
                    }
                }
            }
            Dispatch::Transmitter(event) => {
                let listeners: Vec<_> = self
                    .transmitter
                    .read()
                    .iter()
                    .map(|(_, l)| l.clone())
                    .collect();
                trace!(
                    event = event.name(),
                    listeners = listeners.len(),
                    "Dispatching transmitter event"
                );
                for listener in &listeners {
                    guard_callback(|| route_transmitter_event(listener.as_ref(), &event));
                }
            }
        }
    }
}

fn guard_callback(callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!("Listener panicked; continuing with remaining listeners");
    }
}

/// Both listener sets plus the dispatch task that feeds them
pub struct Listeners {
    registry: Arc<Registry>,
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl Listeners {
    /// Create the registries and start the dispatch task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task_registry = registry.clone();
        tokio::spawn(async move {
            while let Some(dispatch) = rx.recv().await {
                task_registry.deliver(dispatch);
            }
            debug!("Listener dispatch stopped");
        });
        Self { registry, tx }
    }

    /// Register an event listener
    pub fn add_listener(&self, listener: Arc<dyn X10Listener>) -> ListenerId {
        let id = self.registry.allocate_id();
        self.registry.x10.write().push((id, listener));
        id
    }

    /// Remove an event listener; false if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.registry.x10.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Register a transmitter listener
    pub fn add_transmitter_listener(&self, listener: Arc<dyn TransmitterListener>) -> ListenerId {
        let id = self.registry.allocate_id();
        self.registry.transmitter.write().push((id, listener));
        id
    }

    /// Remove a transmitter listener; false if it was not registered
    pub fn remove_transmitter_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.registry.transmitter.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of registered event listeners
    pub fn listener_count(&self) -> usize {
        self.registry.x10.read().len()
    }

    /// Number of registered transmitter listeners
    pub fn transmitter_listener_count(&self) -> usize {
        self.registry.transmitter.read().len()
    }

    /// Queue decoded events for delivery, preserving their order
    pub fn notify_events(&self, events: Vec<X10Event>) {
        if events.is_empty() {
            return;
        }
        if self.tx.send(Dispatch::Events(events)).is_err() {
            debug!("Dispatch task gone; dropping X10 events");
        }
    }

    /// Queue a transmitter event for delivery
    pub fn notify_transmitter(&self, event: TransmitterEvent) {
        if self.tx.send(Dispatch::Transmitter(event)).is_err() {
            debug!(
                event = event.name(),
                "Dispatch task gone; dropping transmitter event"
            );
        }
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("x10", &self.listener_count())
            .field("transmitter", &self.transmitter_listener_count())
            .finish()
    }
}
