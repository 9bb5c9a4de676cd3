//! Error types for X10 value construction and parsing
//!
//! Range violations are raised at construction time and are the only errors
//! that reach a caller synchronously; everything protocol-related lives in
//! the bridge driver crates.

use thiserror::Error;

/// Main error type for X10 value types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum X10Error {
    /// Value does not fit in four bits
    #[error("Nibble value {0} is outside the valid range 0..=15")]
    NibbleOutOfRange(i64),

    /// Brightness level outside 0.0..=1.0
    #[error("Brightness level {0} is outside the valid range 0.0..=1.0")]
    BrightnessOutOfRange(f64),

    /// Symbolic code name could not be parsed
    #[error("Unknown X10 code: {0}")]
    UnknownCode(String),

    /// Function code used with a constructor for a different payload shape
    #[error("Function {function} does not take a {expected} payload")]
    PayloadMismatch {
        /// Function code name
        function: &'static str,
        /// Payload shape the caller supplied
        expected: &'static str,
    },
}

impl X10Error {
    /// Check if this error is a range violation
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            X10Error::NibbleOutOfRange(_) | X10Error::BrightnessOutOfRange(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            X10Error::NibbleOutOfRange(_) => "NIBBLE_OUT_OF_RANGE",
            X10Error::BrightnessOutOfRange(_) => "BRIGHTNESS_OUT_OF_RANGE",
            X10Error::UnknownCode(_) => "UNKNOWN_CODE",
            X10Error::PayloadMismatch { .. } => "PAYLOAD_MISMATCH",
        }
    }
}

/// Result type alias for X10 value operations
pub type Result<T> = std::result::Result<T, X10Error>;
