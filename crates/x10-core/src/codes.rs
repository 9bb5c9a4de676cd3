//! Symbolic X10 codes
//!
//! X10 addresses a device with a house code (A–P) and a unit code (1–16).
//! A frame's second nibble is either a unit address or a function, so both
//! are carried by [`OtherCode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::X10Error;

/// One of the sixteen X10 house codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HouseCode {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
}

impl HouseCode {
    /// All house codes in letter order
    pub const ALL: [HouseCode; 16] = [
        HouseCode::A,
        HouseCode::B,
        HouseCode::C,
        HouseCode::D,
        HouseCode::E,
        HouseCode::F,
        HouseCode::G,
        HouseCode::H,
        HouseCode::I,
        HouseCode::J,
        HouseCode::K,
        HouseCode::L,
        HouseCode::M,
        HouseCode::N,
        HouseCode::O,
        HouseCode::P,
    ];

    /// The house letter
    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

impl fmt::Display for HouseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for HouseCode {
    type Err = X10Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => HouseCode::ALL
                .iter()
                .copied()
                .find(|h| h.letter() == c.to_ascii_uppercase())
                .ok_or_else(|| X10Error::UnknownCode(s.to_string())),
            _ => Err(X10Error::UnknownCode(s.to_string())),
        }
    }
}

/// One of the sixteen X10 unit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitCode {
    Unit1,
    Unit2,
    Unit3,
    Unit4,
    Unit5,
    Unit6,
    Unit7,
    Unit8,
    Unit9,
    Unit10,
    Unit11,
    Unit12,
    Unit13,
    Unit14,
    Unit15,
    Unit16,
}

impl UnitCode {
    /// All unit codes in numeric order
    pub const ALL: [UnitCode; 16] = [
        UnitCode::Unit1,
        UnitCode::Unit2,
        UnitCode::Unit3,
        UnitCode::Unit4,
        UnitCode::Unit5,
        UnitCode::Unit6,
        UnitCode::Unit7,
        UnitCode::Unit8,
        UnitCode::Unit9,
        UnitCode::Unit10,
        UnitCode::Unit11,
        UnitCode::Unit12,
        UnitCode::Unit13,
        UnitCode::Unit14,
        UnitCode::Unit15,
        UnitCode::Unit16,
    ];

    /// The unit number, 1 through 16
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    /// Look up a unit by its number
    pub fn from_number(number: u8) -> Option<Self> {
        number
            .checked_sub(1)
            .and_then(|i| UnitCode::ALL.get(usize::from(i)).copied())
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for UnitCode {
    type Err = X10Error;

    /// Accepts `"7"` or `"UNIT_7"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let digits = upper.strip_prefix("UNIT_").unwrap_or(&upper);
        digits
            .parse::<u8>()
            .ok()
            .and_then(UnitCode::from_number)
            .ok_or_else(|| X10Error::UnknownCode(s.to_string()))
    }
}

/// Payload shape carried by a function code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// No payload
    Basic,
    /// Relative brightness level
    Brightness,
    /// Two raw bytes: data and command
    Extended,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Basic => write!(f, "basic"),
            FunctionKind::Brightness => write!(f, "brightness"),
            FunctionKind::Extended => write!(f, "extended"),
        }
    }
}

/// An X10 command applied to the currently addressed units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCode {
    /// Turn off all units
    AllUnitsOff,
    /// Turn on all lights
    AllLightsOn,
    /// Turn on addressed units
    On,
    /// Turn off addressed units
    Off,
    /// Dim addressed units by a relative amount
    Dim,
    /// Brighten addressed units by a relative amount
    Brighten,
    /// Turn off all lights
    AllLightsOff,
    /// Extended code with data and command bytes
    ExtendedCode,
    /// Hail all addressed units
    HailRequest,
    /// Reply to a hail
    HailAcknowledge,
    /// First preset dim level
    PresetDim1,
    /// Second preset dim level
    PresetDim2,
    /// Extended data transfer follows
    ExtendedDataTransfer,
    /// Addressed unit reports on
    StatusOn,
    /// Addressed unit reports off
    StatusOff,
    /// Ask addressed units for status
    StatusRequest,
}

impl FunctionCode {
    /// All function codes
    pub const ALL: [FunctionCode; 16] = [
        FunctionCode::AllUnitsOff,
        FunctionCode::AllLightsOn,
        FunctionCode::On,
        FunctionCode::Off,
        FunctionCode::Dim,
        FunctionCode::Brighten,
        FunctionCode::AllLightsOff,
        FunctionCode::ExtendedCode,
        FunctionCode::HailRequest,
        FunctionCode::HailAcknowledge,
        FunctionCode::PresetDim1,
        FunctionCode::PresetDim2,
        FunctionCode::ExtendedDataTransfer,
        FunctionCode::StatusOn,
        FunctionCode::StatusOff,
        FunctionCode::StatusRequest,
    ];

    /// Payload shape this function carries
    pub fn kind(self) -> FunctionKind {
        match self {
            FunctionCode::Dim | FunctionCode::Brighten => FunctionKind::Brightness,
            FunctionCode::ExtendedCode => FunctionKind::Extended,
            _ => FunctionKind::Basic,
        }
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            FunctionCode::AllUnitsOff => "ALL_UNITS_OFF",
            FunctionCode::AllLightsOn => "ALL_LIGHTS_ON",
            FunctionCode::On => "ON",
            FunctionCode::Off => "OFF",
            FunctionCode::Dim => "DIM",
            FunctionCode::Brighten => "BRIGHTEN",
            FunctionCode::AllLightsOff => "ALL_LIGHTS_OFF",
            FunctionCode::ExtendedCode => "EXTENDED_CODE",
            FunctionCode::HailRequest => "HAIL_REQUEST",
            FunctionCode::HailAcknowledge => "HAIL_ACKNOWLEDGE",
            FunctionCode::PresetDim1 => "PRESET_DIM_1",
            FunctionCode::PresetDim2 => "PRESET_DIM_2",
            FunctionCode::ExtendedDataTransfer => "EXTENDED_DATA_TRANSFER",
            FunctionCode::StatusOn => "STATUS_ON",
            FunctionCode::StatusOff => "STATUS_OFF",
            FunctionCode::StatusRequest => "STATUS_REQUEST",
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionCode {
    type Err = X10Error;

    /// Case-insensitive; `-` and `_` are interchangeable
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        FunctionCode::ALL
            .iter()
            .copied()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| X10Error::UnknownCode(s.to_string()))
    }
}

/// The second nibble of a frame: a unit address or a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtherCode {
    /// Unit address
    Unit(UnitCode),
    /// Function
    Function(FunctionCode),
}

impl OtherCode {
    /// The unit code, if this is an address
    pub fn unit(self) -> Option<UnitCode> {
        match self {
            OtherCode::Unit(u) => Some(u),
            OtherCode::Function(_) => None,
        }
    }

    /// The function code, if this is a function
    pub fn function(self) -> Option<FunctionCode> {
        match self {
            OtherCode::Function(f) => Some(f),
            OtherCode::Unit(_) => None,
        }
    }
}

impl From<UnitCode> for OtherCode {
    fn from(unit: UnitCode) -> Self {
        OtherCode::Unit(unit)
    }
}

impl From<FunctionCode> for OtherCode {
    fn from(function: FunctionCode) -> Self {
        OtherCode::Function(function)
    }
}

impl fmt::Display for OtherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtherCode::Unit(u) => write!(f, "{u}"),
            OtherCode::Function(func) => write!(f, "{func}"),
        }
    }
}
