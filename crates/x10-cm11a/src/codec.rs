//! CM11A wire format
//!
//! Pure functions that turn events into frames and uploaded buffers back into
//! events. Nothing here touches a transport.
//!
//! # Frame layout
//!
//! An outbound event is a header byte followed by a code byte:
//!
//! ```text
//!  header:  7 6 5 4 3 | 2 | 1 | 0
//!           brightness| 1 | F | X      F = function, X = extended
//!  code:    house nibble | unit/function nibble
//! ```
//!
//! `EXTENDED_CODE` frames carry two more bytes, data then command.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};
use x10_core::{
    EventKind, FunctionCode, FunctionKind, HouseCode, Nibble, OtherCode, UnitCode, X10Event,
    MAX_BRIGHTNESS_LEVEL,
};

use crate::config::{INPUT_BRIGHTNESS_LEVELS, OUTPUT_BRIGHTNESS_LEVELS};
use crate::error::{Cm11aError, Result};

// ===== Bridge -> host =====

/// Bridge is ready for the next request
pub const READY: u8 = 0x55;
/// Bridge lost power and needs its clock set
pub const POWER_FAILURE: u8 = 0xA5;
/// Bridge has buffered power-line traffic to upload
pub const EVENT_RECEIVED: u8 = 0x5A;

// ===== Host -> bridge =====

/// Clock frame header
pub const TIME_UPLOAD: u8 = 0x9B;
/// Macro download header
pub const MACRO_UPLOAD: u8 = 0xFB;
/// Ask the bridge to send its buffer
pub const REQUEST_BUFFER: u8 = 0xC3;
/// Ask the bridge for its status block
pub const REQUEST_STATUS: u8 = 0x8B;
/// Checksum accepted, go ahead
pub const ACKNOWLEDGE: u8 = 0x00;

/// Length of a clock frame
pub const CLOCK_FRAME_LEN: usize = 7;

/// Wire nibble for each code, indexed by declaration order.
///
/// House and unit codes share one sequence; function codes map to their
/// own ordinal.
const CODE_NIBBLES: [u8; 16] = [
    0x6, 0xE, 0x2, 0xA, 0x1, 0x9, 0x5, 0xD, 0x7, 0xF, 0x3, 0xB, 0x0, 0x8, 0x4, 0xC,
];

/// Bidirectional mapping between symbolic codes and wire nibbles
pub struct CodeMap;

impl CodeMap {
    /// Nibble for a house code
    pub fn house_nibble(house: HouseCode) -> Nibble {
        Nibble::low_of(CODE_NIBBLES[house as usize])
    }

    /// Nibble for a unit code
    pub fn unit_nibble(unit: UnitCode) -> Nibble {
        Nibble::low_of(CODE_NIBBLES[unit as usize])
    }

    /// Nibble for a function code
    pub fn function_nibble(function: FunctionCode) -> Nibble {
        Nibble::low_of(function as u8)
    }

    /// Nibble for the second half of a code byte
    pub fn other_nibble(other: OtherCode) -> Nibble {
        match other {
            OtherCode::Unit(u) => Self::unit_nibble(u),
            OtherCode::Function(f) => Self::function_nibble(f),
        }
    }

    /// House code for a nibble
    pub fn house_code(nibble: Nibble) -> Option<HouseCode> {
        Self::position(nibble).map(|i| HouseCode::ALL[i])
    }

    /// Unit code for a nibble
    pub fn unit_code(nibble: Nibble) -> Option<UnitCode> {
        Self::position(nibble).map(|i| UnitCode::ALL[i])
    }

    /// Function code for a nibble
    pub fn function_code(nibble: Nibble) -> Option<FunctionCode> {
        FunctionCode::ALL.get(usize::from(nibble.value())).copied()
    }

    fn position(nibble: Nibble) -> Option<usize> {
        CODE_NIBBLES.iter().position(|n| *n == nibble.value())
    }
}

/// Additive checksum: sum of all bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encode an event as a 2-byte frame, or 4 bytes for `EXTENDED_CODE`
pub fn encode_frame(event: &X10Event) -> Bytes {
    let level = (event.brightness_level() * f64::from(OUTPUT_BRIGHTNESS_LEVELS)) as u8;
    let mut header = level << 3;
    header |= 1 << 2;
    if event.kind() == EventKind::Function {
        header |= 1 << 1;
    }
    if event.is_extended() {
        header |= 1;
    }

    let code = CodeMap::house_nibble(event.house_code())
        .combine_as_high(CodeMap::other_nibble(event.other_code()));

    let mut frame = BytesMut::with_capacity(4);
    frame.put_u8(header);
    frame.put_u8(code);
    if event.is_extended() {
        frame.put_u8(event.data());
        frame.put_u8(event.command());
    }
    frame.freeze()
}

/// Housekeeping flags carried in the last byte of a clock frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockFlags {
    /// Reset the bridge's battery-use timer
    pub clear_battery_timer: bool,
    /// Clear the monitored house status data
    pub clear_status_data: bool,
    /// Purge timers and macros
    pub purge_timer: bool,
}

impl ClockFlags {
    /// No flags set
    pub const NONE: ClockFlags = ClockFlags {
        clear_battery_timer: false,
        clear_status_data: false,
        purge_timer: false,
    };

    /// The low nibble of the house/flags byte
    pub fn bits(self) -> u8 {
        (u8::from(self.clear_battery_timer) << 2)
            | (u8::from(self.clear_status_data) << 1)
            | u8::from(self.purge_timer)
    }
}

/// Encode a clock frame for `time`, monitoring `house`
pub fn encode_clock_frame(
    time: &NaiveDateTime,
    house: HouseCode,
    flags: ClockFlags,
) -> [u8; CLOCK_FRAME_LEN] {
    let hour = time.hour();
    let day_of_year = time.ordinal();
    let weekday_mask = 1u8 << time.weekday().num_days_from_sunday();
    let doy_high = if day_of_year > 255 { 0x80 } else { 0x00 };

    [
        TIME_UPLOAD,
        time.second() as u8,
        (60 * (hour % 2) + time.minute()) as u8,
        (hour / 2) as u8,
        (day_of_year & 0xFF) as u8,
        doy_high | weekday_mask,
        CodeMap::house_nibble(house).combine_as_high(Nibble::low_of(flags.bits())),
    ]
}

/// Split an uploaded code byte into its house and unit/function codes
///
/// `is_function` selects which table the low nibble is looked up in.
pub fn decode_upload_byte(byte: u8, is_function: bool) -> Result<(HouseCode, OtherCode)> {
    let high = Nibble::high_of(byte);
    let low = Nibble::low_of(byte);
    let house = CodeMap::house_code(high).ok_or(Cm11aError::UnmappedNibble(high.value()))?;
    let other = if is_function {
        CodeMap::function_code(low).map(OtherCode::Function)
    } else {
        CodeMap::unit_code(low).map(OtherCode::Unit)
    };
    let other = other.ok_or(Cm11aError::UnmappedNibble(low.value()))?;
    Ok((house, other))
}

/// Convert a raw upload brightness byte to a level in `0.0..=1.0`
///
/// The bridge scale tops out at 210; anything above is clamped.
pub fn brightness_from_raw(raw: u8) -> f64 {
    (f64::from(raw) / f64::from(INPUT_BRIGHTNESS_LEVELS)).min(MAX_BRIGHTNESS_LEVEL)
}

/// Walks the data bytes of an uploaded buffer, yielding one event per entry
///
/// Bit `i` of the mask marks data byte `i` as a function. Brightness
/// functions consume the following byte, extended functions the following
/// two. Iteration stops after the first error.
pub struct UploadDecoder<'a> {
    mask: u8,
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> UploadDecoder<'a> {
    /// Decode `data` using the function/address `mask`
    pub fn new(mask: u8, data: &'a [u8]) -> Self {
        Self {
            mask,
            data,
            pos: 0,
            failed: false,
        }
    }

    fn is_function(&self, index: usize) -> bool {
        index < 8 && self.mask & (1 << index) != 0
    }

    fn take(&mut self) -> Result<u8> {
        let byte = self.data.get(self.pos).copied().ok_or_else(|| {
            Cm11aError::MalformedUpload(format!(
                "buffer ends at byte {} while reading a payload",
                self.pos
            ))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn decode_next(&mut self) -> Result<X10Event> {
        let index = self.pos;
        let code = self.take()?;
        let (house, other) = decode_upload_byte(code, self.is_function(index))?;
        match other {
            OtherCode::Unit(unit) => Ok(X10Event::address(house, unit)),
            OtherCode::Function(function) => match function.kind() {
                FunctionKind::Basic => Ok(X10Event::function(house, function)?),
                FunctionKind::Brightness => {
                    let level = brightness_from_raw(self.take()?);
                    Ok(X10Event::brightness(house, function, level)?)
                }
                FunctionKind::Extended => {
                    let data = self.take()?;
                    let command = self.take()?;
                    Ok(X10Event::extended(house, data, command))
                }
            },
        }
    }
}

impl Iterator for UploadDecoder<'_> {
    type Item = Result<X10Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let item = self.decode_next();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Decode a whole upload, failing if any entry is malformed
pub fn decode_upload(mask: u8, data: &[u8]) -> Result<Vec<X10Event>> {
    UploadDecoder::new(mask, data).collect()
}
