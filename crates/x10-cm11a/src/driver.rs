//! The CM11A driver
//!
//! [`Cm11a`] ties the pieces together: a transmit queue with its worker, an
//! inbound dispatcher task reacting to unsolicited bytes, the listener
//! registries and the clock/housekeeping requests. The transmit worker, the
//! inbound dispatcher and the clock requests all take the same transport
//! lock for the full length of an exchange.

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use x10_core::{HouseCode, TransmitterListener, X10Event, X10Listener};

use crate::codec::ClockFlags;
use crate::config::Cm11aConfig;
use crate::dispatch::{ListenerId, Listeners};
use crate::error::{Cm11aError, Result};
use crate::protocol::{self, ExchangeSettings, SettingsCell};
use crate::queue::TransmitQueue;
use crate::transport::{SharedTransport, X10Transport};

/// Driver for a CM11A on an open transport
pub struct Cm11a<T: X10Transport + 'static> {
    transport: SharedTransport<T>,
    listeners: Arc<Listeners>,
    settings: Arc<SettingsCell>,
    queue: Arc<TransmitQueue<T>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    inbound: Mutex<Option<JoinHandle<()>>>,
}

impl<T: X10Transport + 'static> Cm11a<T> {
    /// Start a driver on `transport`
    ///
    /// Must be called from within a Tokio runtime. The inbound dispatcher
    /// starts immediately; the transmit worker starts with the first
    /// [`Cm11a::transmit`].
    pub fn new(transport: T, config: &Cm11aConfig) -> Result<Self> {
        config.validate()?;
        info!(
            transport = transport.name(),
            maximum_attempts = config.maximum_attempts,
            monitored_house_code = %config.monitored_house_code,
            "Starting CM11A driver"
        );

        let transport = SharedTransport::new(transport);
        let listeners = Arc::new(Listeners::new());
        let settings = Arc::new(SettingsCell::new(ExchangeSettings {
            maximum_attempts: config.maximum_attempts,
            monitored_house_code: config.monitored_house_code,
        }));
        let queue = TransmitQueue::new(transport.clone(), listeners.clone(), settings.clone());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let inbound = tokio::spawn(run_inbound(
            transport.clone(),
            listeners.clone(),
            settings.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            transport,
            listeners,
            settings,
            queue,
            closed: AtomicBool::new(false),
            shutdown,
            inbound: Mutex::new(Some(inbound)),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Cm11aError::Closed)
        } else {
            Ok(())
        }
    }

    /// Queue an event for delivery
    ///
    /// Returns as soon as the event is queued; the outcome is reported to
    /// transmitter listeners.
    pub fn transmit(&self, event: X10Event) -> Result<()> {
        self.ensure_open()?;
        self.queue.push(event);
        Ok(())
    }

    /// Register a listener for events received from the power line
    pub fn add_listener(&self, listener: Arc<dyn X10Listener>) -> ListenerId {
        self.listeners.add_listener(listener)
    }

    /// Remove a listener added with [`Cm11a::add_listener`]
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove_listener(id)
    }

    /// Register a listener for outbound queue notifications
    pub fn add_transmitter_listener(&self, listener: Arc<dyn TransmitterListener>) -> ListenerId {
        self.listeners.add_transmitter_listener(listener)
    }

    /// Remove a listener added with [`Cm11a::add_transmitter_listener`]
    pub fn remove_transmitter_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove_transmitter_listener(id)
    }

    /// Set the bridge clock
    pub async fn set_internal_clock(&self, time: NaiveDateTime) -> Result<()> {
        self.set_clock_with(time, ClockFlags::NONE).await
    }

    /// The bridge clock
    ///
    /// The bridge's status block is not read back; this is the host's local
    /// time, which is what the bridge is kept synchronized to.
    pub fn internal_clock(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    /// Change the monitored house code and clear the bridge's monitoring data
    pub async fn set_monitored_house_code(&self, house: HouseCode) -> Result<()> {
        self.ensure_open()?;
        self.settings.set_monitored_house_code(house);
        self.reset_internal_monitoring_info().await
    }

    /// House code the bridge reports status for
    pub fn monitored_house_code(&self) -> HouseCode {
        self.settings.snapshot().monitored_house_code
    }

    /// Reset the bridge's battery-use timer
    pub async fn reset_internal_battery_timer(&self) -> Result<()> {
        let flags = ClockFlags {
            clear_battery_timer: true,
            ..ClockFlags::NONE
        };
        self.set_clock_with(self.internal_clock(), flags).await
    }

    /// Clear the bridge's monitored status data
    pub async fn reset_internal_monitoring_info(&self) -> Result<()> {
        let flags = ClockFlags {
            clear_status_data: true,
            ..ClockFlags::NONE
        };
        self.set_clock_with(self.internal_clock(), flags).await
    }

    /// Purge the bridge's timers and macros
    pub async fn reset_internal_macro_timers(&self) -> Result<()> {
        let flags = ClockFlags {
            purge_timer: true,
            ..ClockFlags::NONE
        };
        self.set_clock_with(self.internal_clock(), flags).await
    }

    async fn set_clock_with(&self, time: NaiveDateTime, flags: ClockFlags) -> Result<()> {
        self.ensure_open()?;
        let settings = self.settings.snapshot();
        let mut transport = self.transport.lock().await;
        protocol::set_clock(
            &mut *transport,
            &time,
            settings.monitored_house_code,
            flags,
            settings,
            &self.listeners,
        )
        .await
        .map(|_| ())
    }

    /// Attempts per delivery or clock request
    pub fn maximum_attempts(&self) -> u32 {
        self.settings.snapshot().maximum_attempts
    }

    /// Change the attempt budget; applies to exchanges started afterwards
    pub fn set_maximum_attempts(&self, attempts: u32) -> Result<()> {
        if attempts == 0 {
            return Err(Cm11aError::InvalidConfig(
                "maximum_attempts must be at least 1".to_string(),
            ));
        }
        self.settings.set_maximum_attempts(attempts);
        Ok(())
    }

    /// Events waiting to be delivered
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// True while the transmit worker is running
    pub fn is_transmitting(&self) -> bool {
        self.queue.is_running()
    }

    /// True once [`Cm11a::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the worker and dispatcher and release the transport
    ///
    /// An exchange in progress finishes first. Calling this more than once
    /// is harmless; errors from closing the transport are logged, not
    /// returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing CM11A driver");
        self.queue.stop();
        let _ = self.shutdown.send(true);
        let inbound = self.inbound.lock().take();
        if let Some(task) = inbound {
            if let Err(e) = task.await {
                debug!(error = %e, "Inbound dispatcher ended abnormally");
            }
        }

        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.close().await {
            debug!(error = %e, "Ignoring error while closing transport");
        }
    }
}

impl<T: X10Transport + 'static> std::fmt::Debug for Cm11a<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cm11a")
            .field("settings", &self.settings.snapshot())
            .field("queue", &self.queue)
            .field("listeners", &self.listeners)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Wait for input and service whatever the bridge sent unasked
async fn run_inbound<T: X10Transport + 'static>(
    transport: SharedTransport<T>,
    listeners: Arc<Listeners>,
    settings: Arc<SettingsCell>,
    mut shutdown: watch::Receiver<bool>,
) {
    let signal = transport.signal().clone();
    debug!("Inbound dispatcher started");
    loop {
        tokio::select! {
            _ = signal.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }

        loop {
            let mut guard = transport.lock().await;
            if guard.bytes_available() == 0 {
                break;
            }
            let byte = match guard.read_byte().await {
                Ok(byte) => byte,
                Err(e) => {
                    debug!(error = %e, "Inbound read failed");
                    break;
                }
            };
            trace!(byte, "Unsolicited byte from bridge");
            if let Err(e) =
                protocol::handle_unsolicited(&mut *guard, byte, settings.snapshot(), &listeners)
                    .await
            {
                warn!(error = %e, code = e.error_code(), "Failed to service bridge request");
            }
        }
    }
    debug!("Inbound dispatcher stopped");
}
