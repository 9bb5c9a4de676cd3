//! Serial port transport for the CM11A
//!
//! A reader task pumps whatever the port delivers into a channel and raises
//! the data signal; reads then drain a local buffer, waiting on the channel
//! for at most the configured read timeout.

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::{Cm11aConfig, Parity, StopBits};
use crate::error::{Cm11aError, Result};
use crate::transport::{DataSignal, X10Transport};

/// Buffer size for reading from serial port
const READ_BUFFER_SIZE: usize = 64;

/// Chunks the reader task may queue ahead of the protocol
const CHANNEL_CAPACITY: usize = 64;

/// Serial connection to a CM11A
pub struct SerialTransport {
    /// Serial port path
    port_path: PathBuf,

    /// Per-byte read timeout
    read_timeout: Duration,

    /// Write half (None once closed)
    writer: Option<WriteHalf<SerialStream>>,

    /// Chunks from the reader task
    incoming: mpsc::Receiver<Bytes>,

    /// Bytes queued in `incoming` but not yet received
    in_flight: Arc<AtomicUsize>,

    /// Received bytes not yet consumed
    pending: BytesMut,

    /// Raised by the reader task on every chunk
    signal: DataSignal,

    /// Reader task
    pump: Option<JoinHandle<()>>,

    /// Interface name for logging
    name: String,
}

impl SerialTransport {
    /// Open the port described by `config` and start reading
    pub async fn open(config: &Cm11aConfig) -> Result<Self> {
        config.validate()?;
        let serial = &config.serial;
        let port_path = serial.port.clone();
        info!(port = %port_path.display(), baud = serial.baud_rate, "Opening serial port");

        if !port_path.exists() {
            return Err(Cm11aError::PortNotFound(port_path.display().to_string()));
        }

        let stream = tokio_serial::new(port_path.to_string_lossy(), serial.baud_rate)
            .data_bits(data_bits(serial.data_bits))
            .stop_bits(match serial.stop_bits {
                StopBits::One => tokio_serial::StopBits::One,
                StopBits::Two => tokio_serial::StopBits::Two,
            })
            .parity(match serial.parity {
                Parity::None => tokio_serial::Parity::None,
                Parity::Odd => tokio_serial::Parity::Odd,
                Parity::Even => tokio_serial::Parity::Even,
            })
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| Cm11aError::PortOpenFailed {
                port: port_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = tokio::io::split(stream);
        let (tx, incoming) = mpsc::channel(CHANNEL_CAPACITY);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let signal = DataSignal::new();
        let pump = tokio::spawn(pump_input(reader, tx, in_flight.clone(), signal.clone()));

        info!(port = %port_path.display(), "Connected to CM11A");
        Ok(Self {
            name: format!("serial:{}", port_path.display()),
            port_path,
            read_timeout: config.read_timeout,
            writer: Some(writer),
            incoming,
            in_flight,
            pending: BytesMut::with_capacity(READ_BUFFER_SIZE),
            signal,
            pump: Some(pump),
        })
    }

    /// Get the port path
    pub fn port_path(&self) -> &std::path::Path {
        &self.port_path
    }

    fn accept(&mut self, chunk: Bytes) {
        self.in_flight.fetch_sub(chunk.len(), Ordering::AcqRel);
        self.pending.extend_from_slice(&chunk);
    }
}

fn data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

async fn pump_input(
    mut reader: ReadHalf<SerialStream>,
    tx: mpsc::Sender<Bytes>,
    in_flight: Arc<AtomicUsize>,
    signal: DataSignal,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                warn!("Serial port reached EOF");
                break;
            }
            Ok(n) => {
                trace!(bytes = n, data = ?&buf[..n], "Read from serial port");
                in_flight.fetch_add(n, Ordering::AcqRel);
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    break;
                }
                signal.raise();
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                error!(error = %e, "Serial read error");
                break;
            }
        }
    }
    debug!("Serial reader stopped");
}

#[async_trait]
impl X10Transport for SerialTransport {
    async fn read_byte(&mut self) -> Result<u8> {
        if self.pending.has_remaining() {
            return Ok(self.pending.get_u8());
        }
        if self.writer.is_none() {
            return Err(Cm11aError::Closed);
        }
        match tokio::time::timeout(self.read_timeout, self.incoming.recv()).await {
            Ok(Some(chunk)) => {
                self.accept(chunk);
                if self.pending.has_remaining() {
                    Ok(self.pending.get_u8())
                } else {
                    Err(Cm11aError::ReadError("empty chunk".to_string()))
                }
            }
            Ok(None) => Err(Cm11aError::Disconnected),
            Err(_) => Err(Cm11aError::ReadTimeout {
                timeout_ms: self.read_timeout.as_millis() as u64,
            }),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Cm11aError::Closed)?;
        trace!(data = ?bytes, "Writing to serial port");
        writer.write_all(bytes).await.map_err(|e| {
            error!(error = %e, "Serial write error");
            Cm11aError::WriteError(e.to_string())
        })
    }

    async fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Cm11aError::Closed)?;
        writer
            .flush()
            .await
            .map_err(|e| Cm11aError::WriteError(format!("Flush failed: {}", e)))
    }

    fn bytes_available(&self) -> usize {
        self.pending.len() + self.in_flight.load(Ordering::Acquire)
    }

    fn clear_input(&mut self) {
        while let Ok(chunk) = self.incoming.try_recv() {
            self.accept(chunk);
        }
        if !self.pending.is_empty() {
            trace!(discarded = self.pending.len(), "Clearing serial input");
        }
        self.pending.clear();
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Ignoring error while closing serial port");
            }
            info!(port = %self.port_path.display(), "Closed serial port");
        }
        self.incoming.close();
        self.pending.clear();
        Ok(())
    }

    fn data_signal(&self) -> DataSignal {
        self.signal.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port_path)
            .field("read_timeout", &self.read_timeout)
            .field("open", &self.writer.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}
