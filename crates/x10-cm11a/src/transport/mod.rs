//! Byte transports to the bridge
//!
//! The protocol layer only needs an already-open duplex byte stream with
//! per-byte reads, a count of buffered input, and a way to learn that input
//! has arrived. [`X10Transport`] captures that; [`DataSignal`] is the
//! arrival notification.
//!
//! All access goes through [`SharedTransport::lock`]. The returned
//! [`TransportGuard`] keeps the transport for one whole exchange and holds
//! the data signal suspended while it does, so the inbound dispatcher is
//! never woken to read bytes that belong to someone else's exchange.
//!
//! - [`SerialTransport`] - serial port via tokio-serial (requires `serial` feature)
//! - [`crate::test_utils::ScriptedTransport`] - in-memory bridge for tests

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::trace;

use crate::error::Result;

/// Duplex byte stream to a CM11A
///
/// Reads wait at most the transport's read timeout and fail with
/// [`crate::Cm11aError::ReadTimeout`] rather than block forever.
#[async_trait]
pub trait X10Transport: Send {
    /// Read one byte
    async fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte().await?;
        }
        Ok(())
    }

    /// Write all of `bytes`
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush buffered output to the device
    async fn flush(&mut self) -> Result<()>;

    /// Number of input bytes that can be read without waiting
    fn bytes_available(&self) -> usize;

    /// Discard all buffered input
    fn clear_input(&mut self);

    /// Release the underlying device
    async fn close(&mut self) -> Result<()>;

    /// Signal raised whenever input arrives
    fn data_signal(&self) -> DataSignal;

    /// Transport name (for logging)
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct Gate {
    suspended: bool,
    missed: bool,
}

#[derive(Debug, Default)]
struct SignalState {
    notify: Notify,
    gate: parking_lot::Mutex<Gate>,
}

/// "Data available" notification with suspend/resume
///
/// Clones share one signal. A raise while suspended is remembered and
/// delivered on resume.
#[derive(Debug, Clone, Default)]
pub struct DataSignal {
    state: Arc<SignalState>,
}

impl DataSignal {
    /// Create a new, unsuspended signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that input arrived
    pub fn raise(&self) {
        {
            let mut gate = self.state.gate.lock();
            if gate.suspended {
                gate.missed = true;
                return;
            }
        }
        self.state.notify.notify_one();
    }

    /// Hold back notifications
    pub fn suspend(&self) {
        self.state.gate.lock().suspended = true;
    }

    /// Deliver notifications again, including one held back while suspended
    pub fn resume(&self) {
        let missed = {
            let mut gate = self.state.gate.lock();
            gate.suspended = false;
            std::mem::take(&mut gate.missed)
        };
        if missed {
            self.state.notify.notify_one();
        }
    }

    /// True while suspended
    pub fn is_suspended(&self) -> bool {
        self.state.gate.lock().suspended
    }

    /// Wait for the next raise
    pub async fn notified(&self) {
        self.state.notify.notified().await;
    }
}

/// A transport shared between the transmit worker and the inbound dispatcher
pub struct SharedTransport<T> {
    transport: Arc<Mutex<T>>,
    signal: DataSignal,
}

impl<T> Clone for SharedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            signal: self.signal.clone(),
        }
    }
}

impl<T: X10Transport> SharedTransport<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        let signal = transport.data_signal();
        Self {
            transport: Arc::new(Mutex::new(transport)),
            signal,
        }
    }

    /// The transport's data signal
    pub fn signal(&self) -> &DataSignal {
        &self.signal
    }

    /// Take exclusive use of the transport for one exchange
    pub async fn lock(&self) -> TransportGuard<'_, T> {
        let guard = self.transport.lock().await;
        self.signal.suspend();
        trace!(transport = guard.name(), "Transport locked");
        TransportGuard {
            guard,
            signal: self.signal.clone(),
        }
    }
}

/// Exclusive access to a transport; the data signal is suspended until drop
pub struct TransportGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    signal: DataSignal,
}

impl<T> Deref for TransportGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for TransportGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for TransportGuard<'_, T> {
    fn drop(&mut self) {
        self.signal.resume();
    }
}
