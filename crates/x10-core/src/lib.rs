//! X10 power-line codes and event model
//!
//! This crate holds everything about X10 that does not depend on a
//! particular interface: the house/unit/function code enumerations, the
//! immutable [`X10Event`] value, the observer traits through which events
//! are reported, and an [`X10Monitor`] that derives per-unit on/off and
//! brightness state from the event stream.
//!
//! The CM11A serial bridge driver lives in the `x10-cm11a` crate.
//!
//! # Example
//!
//! ```rust
//! use x10_core::{FunctionCode, HouseCode, UnitCode, X10Event, X10Monitor};
//!
//! let monitor = X10Monitor::new();
//! monitor.record_events(&[
//!     X10Event::address(HouseCode::A, UnitCode::Unit1),
//!     X10Event::function(HouseCode::A, FunctionCode::On).unwrap(),
//! ]);
//! assert!(monitor.is_on(HouseCode::A, UnitCode::Unit1));
//! ```

pub mod codes;
pub mod error;
pub mod event;
pub mod listener;
pub mod monitor;
pub mod nibble;

pub use codes::{FunctionCode, FunctionKind, HouseCode, OtherCode, UnitCode};
pub use error::{Result, X10Error};
pub use event::{
    EventKind, Payload, TransmitterEvent, X10Event, MAX_BRIGHTNESS_LEVEL, MIN_BRIGHTNESS_LEVEL,
};
pub use listener::{route_event, route_transmitter_event, TransmitterListener, X10Listener};
pub use monitor::{UnitStatus, X10Monitor};
pub use nibble::Nibble;
