//! CM11A - driver for the X10 CM11A serial power-line bridge
//!
//! The CM11A sits on a serial line at 4800 baud and relays between the host
//! and the power line. This crate speaks its protocol:
//!
//! - **Transmit**: events are queued and delivered in order by a background
//!   worker, each with a checksum handshake and bounded retries
//! - **Receive**: unsolicited uploads of power-line traffic are decoded and
//!   fanned out to registered listeners
//! - **Recovery**: power-failure reports are answered by resetting the
//!   bridge clock
//! - **Housekeeping**: clock, battery timer, monitoring data and macro timers
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use x10_cm11a::test_utils::{healthy_bridge, ScriptedTransport};
//! use x10_cm11a::{Cm11a, Cm11aConfig};
//! use x10_core::{FunctionCode, HouseCode, UnitCode, X10Event, X10Monitor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, _bridge) = ScriptedTransport::new(healthy_bridge());
//!     let cm11a = Cm11a::new(transport, &Cm11aConfig::default())?;
//!
//!     let monitor = Arc::new(X10Monitor::new());
//!     cm11a.add_listener(monitor.clone());
//!     cm11a.add_transmitter_listener(monitor.clone());
//!
//!     cm11a.transmit(X10Event::address(HouseCode::A, UnitCode::Unit1))?;
//!     cm11a.transmit(X10Event::function(HouseCode::A, FunctionCode::On)?)?;
//!
//!     cm11a.close().await;
//!     Ok(())
//! }
//! ```
//!
//! With the `serial` feature, [`transport::SerialTransport`] opens a real
//! port from a [`Cm11aConfig`].

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod test_utils;
pub mod transport;

pub use codec::{ClockFlags, CodeMap};
pub use config::{
    Cm11aConfig, Cm11aConfigBuilder, Parity, SerialConfig, StopBits, DEFAULT_BAUD_RATE,
    DEFAULT_DATA_BITS, DEFAULT_MAXIMUM_ATTEMPTS, DEFAULT_READ_TIMEOUT_MS,
    INPUT_BRIGHTNESS_LEVELS, OUTPUT_BRIGHTNESS_LEVELS,
};
pub use dispatch::ListenerId;
pub use driver::Cm11a;
pub use error::{Cm11aError, Result};
pub use transport::{DataSignal, X10Transport};

#[cfg(feature = "serial")]
pub use transport::SerialTransport;
