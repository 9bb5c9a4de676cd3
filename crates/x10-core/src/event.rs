//! X10 events
//!
//! An [`X10Event`] is one logical power-line message: either an address
//! (house + unit) or a function (house + function, with a brightness or
//! extended payload for the functions that take one). Events are immutable
//! once built, and the constructors refuse payloads that do not match the
//! function's [`FunctionKind`].
//!
//! [`TransmitterEvent`] reports the lifecycle of the outbound queue.

use serde::Serialize;
use std::fmt;

use crate::codes::{FunctionCode, FunctionKind, HouseCode, OtherCode, UnitCode};
use crate::error::{Result, X10Error};

/// Largest brightness level, 100%
pub const MAX_BRIGHTNESS_LEVEL: f64 = 1.0;

/// Smallest brightness level, 0%
pub const MIN_BRIGHTNESS_LEVEL: f64 = 0.0;

/// Whether an event addresses a unit or carries a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// Second nibble is a unit code
    Address,
    /// Second nibble is a function code
    Function,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Address => write!(f, "ADDRESS"),
            EventKind::Function => write!(f, "FUNCTION"),
        }
    }
}

/// Extra data carried by brightness and extended functions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    /// Addresses and basic functions
    None,
    /// Relative brightness in `0.0..=1.0`
    Brightness {
        /// Fraction of full scale
        level: f64,
    },
    /// Extended code bytes
    Extended {
        /// Data byte
        data: u8,
        /// Command byte
        command: u8,
    },
}

/// A single logical X10 message
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct X10Event {
    house_code: HouseCode,
    other_code: OtherCode,
    payload: Payload,
}

impl X10Event {
    /// Address a unit
    pub fn address(house_code: HouseCode, unit_code: UnitCode) -> Self {
        Self {
            house_code,
            other_code: OtherCode::Unit(unit_code),
            payload: Payload::None,
        }
    }

    /// A function with no payload
    ///
    /// Fails if `function` expects a brightness or extended payload.
    pub fn function(house_code: HouseCode, function: FunctionCode) -> Result<Self> {
        Self::expect_kind(function, FunctionKind::Basic)?;
        Ok(Self {
            house_code,
            other_code: OtherCode::Function(function),
            payload: Payload::None,
        })
    }

    /// A brightness function (`DIM` or `BRIGHTEN`)
    ///
    /// Fails with a range error if `level` is outside `0.0..=1.0`.
    pub fn brightness(house_code: HouseCode, function: FunctionCode, level: f64) -> Result<Self> {
        Self::expect_kind(function, FunctionKind::Brightness)?;
        if !(MIN_BRIGHTNESS_LEVEL..=MAX_BRIGHTNESS_LEVEL).contains(&level) {
            return Err(X10Error::BrightnessOutOfRange(level));
        }
        Ok(Self {
            house_code,
            other_code: OtherCode::Function(function),
            payload: Payload::Brightness { level },
        })
    }

    /// An `EXTENDED_CODE` function with its data and command bytes
    pub fn extended(house_code: HouseCode, data: u8, command: u8) -> Self {
        Self {
            house_code,
            other_code: OtherCode::Function(FunctionCode::ExtendedCode),
            payload: Payload::Extended { data, command },
        }
    }

    fn expect_kind(function: FunctionCode, expected: FunctionKind) -> Result<()> {
        if function.kind() == expected {
            Ok(())
        } else {
            Err(X10Error::PayloadMismatch {
                function: function.name(),
                expected: match expected {
                    FunctionKind::Basic => "basic",
                    FunctionKind::Brightness => "brightness",
                    FunctionKind::Extended => "extended",
                },
            })
        }
    }

    /// House code
    pub fn house_code(&self) -> HouseCode {
        self.house_code
    }

    /// Unit or function code
    pub fn other_code(&self) -> OtherCode {
        self.other_code
    }

    /// Address or function
    pub fn kind(&self) -> EventKind {
        match self.other_code {
            OtherCode::Unit(_) => EventKind::Address,
            OtherCode::Function(_) => EventKind::Function,
        }
    }

    /// Unit code, for address events
    pub fn unit_code(&self) -> Option<UnitCode> {
        self.other_code.unit()
    }

    /// Function code, for function events
    pub fn function_code(&self) -> Option<FunctionCode> {
        self.other_code.function()
    }

    /// Payload carried by the event
    pub fn payload(&self) -> Payload {
        self.payload
    }

    /// Brightness level; `0.0` unless this is a brightness function
    pub fn brightness_level(&self) -> f64 {
        match self.payload {
            Payload::Brightness { level } => level,
            _ => MIN_BRIGHTNESS_LEVEL,
        }
    }

    /// Extended data byte; `0` unless this is an extended function
    pub fn data(&self) -> u8 {
        match self.payload {
            Payload::Extended { data, .. } => data,
            _ => 0,
        }
    }

    /// Extended command byte; `0` unless this is an extended function
    pub fn command(&self) -> u8 {
        match self.payload {
            Payload::Extended { command, .. } => command,
            _ => 0,
        }
    }

    /// True if this is the `EXTENDED_CODE` function
    pub fn is_extended(&self) -> bool {
        self.other_code == OtherCode::Function(FunctionCode::ExtendedCode)
    }
}

impl fmt::Display for X10Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.other_code, self.payload) {
            (OtherCode::Unit(unit), _) => write!(f, "{}{}", self.house_code, unit),
            (OtherCode::Function(func), Payload::Brightness { level }) => {
                write!(f, "{} {} {:.0}%", self.house_code, func, level * 100.0)
            }
            (OtherCode::Function(func), Payload::Extended { data, command }) => {
                write!(
                    f,
                    "{} {} data={:#04x} command={:#04x}",
                    self.house_code, func, data, command
                )
            }
            (OtherCode::Function(func), Payload::None) => {
                write!(f, "{} {}", self.house_code, func)
            }
        }
    }
}

/// Outbound queue lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TransmitterEvent {
    /// An event was appended to the queue
    QueueUpdated(X10Event),
    /// The queue became empty; carries the event just taken from it
    QueueEmptied(Option<X10Event>),
    /// Every delivery attempt for the event failed
    EventUndelivered(X10Event),
    /// The bridge accepted the event
    EventDelivered(X10Event),
}

impl TransmitterEvent {
    /// The related X10 event, if any
    pub fn x10_event(&self) -> Option<&X10Event> {
        match self {
            TransmitterEvent::QueueUpdated(e)
            | TransmitterEvent::EventUndelivered(e)
            | TransmitterEvent::EventDelivered(e) => Some(e),
            TransmitterEvent::QueueEmptied(e) => e.as_ref(),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            TransmitterEvent::QueueUpdated(_) => "QUEUE_UPDATED",
            TransmitterEvent::QueueEmptied(_) => "QUEUE_EMPTIED",
            TransmitterEvent::EventUndelivered(_) => "EVENT_UNDELIVERED",
            TransmitterEvent::EventDelivered(_) => "EVENT_DELIVERED",
        }
    }
}
