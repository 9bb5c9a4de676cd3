//! In-memory bridge for testing without hardware
//!
//! [`ScriptedTransport`] stands in for the serial port. Every write is
//! recorded and handed to a responder closure; whatever the responder
//! returns becomes readable input, exactly as if the CM11A had replied.
//! The paired [`BridgeHandle`] lets a test inject unsolicited bytes and
//! inspect the traffic.
//!
//! # Example
//!
//! ```rust
//! use x10_cm11a::test_utils::{healthy_bridge, ScriptedTransport};
//!
//! let (transport, bridge) = ScriptedTransport::new(healthy_bridge());
//! bridge.inject(&[x10_cm11a::codec::EVENT_RECEIVED]);
//! assert_eq!(bridge.pending_input(), 1);
//! # drop(transport);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

use crate::codec::{checksum, ACKNOWLEDGE, READY, REQUEST_BUFFER};
use crate::error::{Cm11aError, Result};
use crate::transport::{DataSignal, X10Transport};

/// Default read timeout for scripted transports
pub const SCRIPTED_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Produces the bridge's reply to one write
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// A bridge that checksums every frame and answers every acknowledge with
/// READY. Buffer requests get an empty reply.
pub fn healthy_bridge() -> Responder {
    Box::new(|written: &[u8]| match written {
        [ACKNOWLEDGE] => vec![READY],
        [REQUEST_BUFFER] => vec![0],
        frame => vec![checksum(frame)],
    })
}

#[derive(Default)]
struct Shared {
    inbox: Mutex<VecDeque<u8>>,
    writes: Mutex<Vec<Vec<u8>>>,
    arrived: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn push(&self, bytes: &[u8], signal: &DataSignal) {
        if bytes.is_empty() {
            return;
        }
        self.inbox.lock().extend(bytes.iter().copied());
        self.arrived.notify_waiters();
        signal.raise();
    }
}

/// Transport backed by a responder closure
pub struct ScriptedTransport {
    shared: Arc<Shared>,
    responder: Responder,
    signal: DataSignal,
    read_timeout: Duration,
}

impl ScriptedTransport {
    /// Create a transport and the handle that controls it
    pub fn new(responder: Responder) -> (Self, BridgeHandle) {
        let shared = Arc::new(Shared::default());
        let signal = DataSignal::new();
        let transport = Self {
            shared: shared.clone(),
            responder,
            signal: signal.clone(),
            read_timeout: SCRIPTED_READ_TIMEOUT,
        };
        (transport, BridgeHandle { shared, signal })
    }

    /// Use a different read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            Err(Cm11aError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl X10Transport for ScriptedTransport {
    async fn read_byte(&mut self) -> Result<u8> {
        let deadline = tokio::time::Instant::now() + self.read_timeout;
        loop {
            self.ensure_open()?;
            let arrived = self.shared.arrived.notified();
            let next = self.shared.inbox.lock().pop_front();
            if let Some(byte) = next {
                return Ok(byte);
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Err(Cm11aError::ReadTimeout {
                    timeout_ms: self.read_timeout.as_millis() as u64,
                });
            }
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        trace!(data = ?bytes, "Scripted write");
        self.shared.writes.lock().push(bytes.to_vec());
        let reply = (self.responder)(bytes);
        self.shared.push(&reply, &self.signal);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn bytes_available(&self) -> usize {
        self.shared.inbox.lock().len()
    }

    fn clear_input(&mut self) {
        self.shared.inbox.lock().clear();
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.arrived.notify_waiters();
        Ok(())
    }

    fn data_signal(&self) -> DataSignal {
        self.signal.clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Test-side control of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct BridgeHandle {
    shared: Arc<Shared>,
    signal: DataSignal,
}

impl BridgeHandle {
    /// Deliver unsolicited bytes from the bridge
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.push(bytes, &self.signal);
    }

    /// Every write so far, one entry per `write_all`
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.writes.lock().clone()
    }

    /// Writes that were whole frames (more than one byte)
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.writes().into_iter().filter(|w| w.len() > 1).collect()
    }

    /// Count writes equal to `bytes`
    pub fn count_writes(&self, bytes: &[u8]) -> usize {
        self.shared
            .writes
            .lock()
            .iter()
            .filter(|w| w.as_slice() == bytes)
            .count()
    }

    /// Bytes waiting to be read
    pub fn pending_input(&self) -> usize {
        self.shared.inbox.lock().len()
    }

    /// True once the transport has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responder_replies_become_input() {
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        transport.write_all(&[0x04, 0x66]).await.unwrap();
        assert_eq!(transport.bytes_available(), 1);
        assert_eq!(transport.read_byte().await.unwrap(), 0x6A);

        transport.write_all(&[ACKNOWLEDGE]).await.unwrap();
        assert_eq!(transport.read_byte().await.unwrap(), READY);
        assert_eq!(bridge.writes(), vec![vec![0x04, 0x66], vec![ACKNOWLEDGE]]);
        assert_eq!(bridge.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (transport, _bridge) = ScriptedTransport::new(healthy_bridge());
        let mut transport = transport.with_read_timeout(Duration::from_millis(20));
        let err = transport.read_byte().await.unwrap_err();
        assert_eq!(err.error_code(), "READ_TIMEOUT");
    }

    #[tokio::test]
    async fn test_inject_wakes_blocked_reader() {
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        let reader = tokio::spawn(async move { transport.read_byte().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bridge.inject(&[0xA5]);
        assert_eq!(reader.await.unwrap().unwrap(), 0xA5);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_io() {
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        transport.close().await.unwrap();
        assert!(bridge.is_closed());
        assert!(matches!(
            transport.write_all(&[0x00]).await,
            Err(Cm11aError::Closed)
        ));
        assert!(matches!(transport.read_byte().await, Err(Cm11aError::Closed)));
    }

    #[tokio::test]
    async fn test_clear_input() {
        let (mut transport, bridge) = ScriptedTransport::new(healthy_bridge());
        bridge.inject(&[1, 2, 3]);
        transport.clear_input();
        assert_eq!(bridge.pending_input(), 0);
    }
}
