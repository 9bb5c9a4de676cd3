//! Outbound event queue and its worker
//!
//! Callers append to a FIFO; one worker task drains it, delivering each
//! event over the shared transport. The worker exits when the queue is empty
//! and is restarted by the next push. Whether a worker is running is tracked
//! under the same lock as the queue itself, so an event pushed while the
//! worker is deciding to exit is never stranded.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace};
use x10_core::{TransmitterEvent, X10Event};

use crate::dispatch::Listeners;
use crate::protocol::{self, SettingsCell};
use crate::transport::{SharedTransport, X10Transport};

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<X10Event>,
    worker_running: bool,
}

/// FIFO of pending events with a single delivery worker
pub struct TransmitQueue<T> {
    state: Mutex<QueueState>,
    stop_requested: AtomicBool,
    transport: SharedTransport<T>,
    listeners: Arc<Listeners>,
    settings: Arc<SettingsCell>,
    runtime: Handle,
}

impl<T: X10Transport + 'static> TransmitQueue<T> {
    /// Create an idle queue
    ///
    /// Must be called from within a Tokio runtime; the worker is spawned on
    /// that runtime.
    pub fn new(
        transport: SharedTransport<T>,
        listeners: Arc<Listeners>,
        settings: Arc<SettingsCell>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            stop_requested: AtomicBool::new(false),
            transport,
            listeners,
            settings,
            runtime: Handle::current(),
        })
    }

    /// Append an event and make sure the worker is running
    pub fn push(self: &Arc<Self>, event: X10Event) {
        self.state.lock().events.push_back(event);
        trace!(%event, "Event queued");
        self.listeners.notify_transmitter(TransmitterEvent::QueueUpdated(event));
        self.start();
    }

    /// Start the worker if there is work and none is running
    pub fn start(self: &Arc<Self>) {
        self.stop_requested.store(false, Ordering::Release);
        let mut state = self.state.lock();
        if state.worker_running || state.events.is_empty() {
            return;
        }
        state.worker_running = true;
        drop(state);

        debug!("Starting transmit worker");
        self.runtime.spawn(Self::run_worker(self.clone()));
    }

    /// Ask the worker to exit before its next event
    ///
    /// An exchange already in progress runs to completion. Queued events stay
    /// queued until [`TransmitQueue::start`] or the next push.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// True while a worker task is alive
    pub fn is_running(&self) -> bool {
        self.state.lock().worker_running
    }

    /// Number of events waiting
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// True if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_event(&self) -> Option<(X10Event, bool)> {
        let mut state = self.state.lock();
        if self.stop_requested.load(Ordering::Acquire) {
            state.worker_running = false;
            return None;
        }
        match state.events.pop_front() {
            Some(event) => Some((event, state.events.is_empty())),
            None => {
                state.worker_running = false;
                None
            }
        }
    }

    async fn run_worker(queue: Arc<Self>) {
        while let Some((event, emptied)) = queue.next_event() {
            if emptied {
                queue
                    .listeners
                    .notify_transmitter(TransmitterEvent::QueueEmptied(Some(event)));
            }

            let settings = queue.settings.snapshot();
            let outcome = {
                let mut transport = queue.transport.lock().await;
                protocol::deliver(&mut *transport, &event, settings, &queue.listeners).await
            };

            let notice = match outcome {
                Ok(_) => TransmitterEvent::EventDelivered(event),
                Err(e) => {
                    debug!(%event, error = %e, "Event undelivered");
                    TransmitterEvent::EventUndelivered(event)
                }
            };
            queue.listeners.notify_transmitter(notice);
        }
        debug!("Transmit worker stopped");
    }
}

impl<T> std::fmt::Debug for TransmitQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransmitQueue")
            .field("pending", &state.events.len())
            .field("worker_running", &state.worker_running)
            .field("stop_requested", &self.stop_requested.load(Ordering::Relaxed))
            .finish()
    }
}
