//! Four-bit unsigned values
//!
//! Every X10 code travels as one nibble of a frame byte: the house code in
//! the high half and the unit or function code in the low half.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, X10Error};

/// An unsigned 4-bit value in `0..=15`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Nibble(u8);

impl Nibble {
    /// Largest representable value
    pub const MAX_VALUE: u8 = 0xF;
    /// Smallest representable value
    pub const MIN_VALUE: u8 = 0x0;

    /// Create a nibble, failing if `value` is outside `0..=15`
    pub fn new(value: i64) -> Result<Self> {
        if value < i64::from(Self::MIN_VALUE) || value > i64::from(Self::MAX_VALUE) {
            return Err(X10Error::NibbleOutOfRange(value));
        }
        Ok(Self(value as u8))
    }

    /// High four bits of a byte
    pub const fn high_of(byte: u8) -> Self {
        Self(byte >> 4)
    }

    /// Low four bits of a byte
    pub const fn low_of(byte: u8) -> Self {
        Self(byte & 0x0F)
    }

    /// The raw value
    pub const fn value(self) -> u8 {
        self.0
    }

    /// This nibble shifted into the high half of a byte
    pub const fn as_high(self) -> u8 {
        self.0 << 4
    }

    /// Byte with `self` in the high half and `low` in the low half
    pub const fn combine_as_high(self, low: Nibble) -> u8 {
        (self.0 << 4) | low.0
    }

    /// Byte with `self` in the low half and `high` in the high half
    pub const fn combine_as_low(self, high: Nibble) -> u8 {
        high.combine_as_high(self)
    }
}

impl TryFrom<u8> for Nibble {
    type Error = X10Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(i64::from(value))
    }
}

impl From<Nibble> for u8 {
    fn from(nibble: Nibble) -> Self {
        nibble.0
    }
}

impl fmt::Display for Nibble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
