//! Error types for CM11A bridge operations
//!
//! Most of these never reach a caller: per-attempt transport failures and
//! checksum disagreements are logged and counted against the retry budget
//! by the protocol layer. Callers see construction errors, configuration
//! errors and the outcome of explicit clock requests.

use thiserror::Error;
use x10_core::X10Error;

/// Main error type for CM11A bridge operations
#[derive(Error, Debug)]
pub enum Cm11aError {
    /// Invalid X10 value
    #[error(transparent)]
    Core(#[from] X10Error),

    // ===== Serial/Transport Errors =====
    /// Serial port not found
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port open failed
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port path
        port: String,
        /// Failure reason
        reason: String,
    },

    /// No byte arrived within the read timeout
    #[error("Read timed out after {timeout_ms}ms")]
    ReadTimeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Serial read error
    #[error("Serial read error: {0}")]
    ReadError(String),

    /// Serial write error
    #[error("Serial write error: {0}")]
    WriteError(String),

    /// Transport went away underneath us
    #[error("Transport disconnected")]
    Disconnected,

    /// Driver or transport was closed
    #[error("CM11A driver is closed")]
    Closed,

    // ===== Protocol Errors =====
    /// Bridge echoed a checksum that does not match the frame
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{got:02X}")]
    ChecksumMismatch {
        /// Locally computed checksum
        expected: u8,
        /// Byte returned by the bridge
        got: u8,
    },

    /// Retry budget spent without a READY reply
    #[error("Delivery failed after {attempts} attempts")]
    DeliveryExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Upload buffer too short or truncated
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    /// Nibble with no entry in the code map
    #[error("Unmapped nibble: 0x{0:X}")]
    UnmappedNibble(u8),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Cm11aError {
    /// Check if a new attempt may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Cm11aError::ReadTimeout { .. }
                | Cm11aError::ReadError(_)
                | Cm11aError::WriteError(_)
                | Cm11aError::ChecksumMismatch { .. }
                | Cm11aError::Io(_)
        )
    }

    /// Check if this is a protocol error (bad data from the bridge)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Cm11aError::ChecksumMismatch { .. }
                | Cm11aError::MalformedUpload(_)
                | Cm11aError::UnmappedNibble(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            Cm11aError::Core(e) => e.error_code(),
            Cm11aError::PortNotFound(_) => "PORT_NOT_FOUND",
            Cm11aError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            Cm11aError::ReadTimeout { .. } => "READ_TIMEOUT",
            Cm11aError::ReadError(_) => "READ_ERROR",
            Cm11aError::WriteError(_) => "WRITE_ERROR",
            Cm11aError::Disconnected => "DISCONNECTED",
            Cm11aError::Closed => "CLOSED",
            Cm11aError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Cm11aError::DeliveryExhausted { .. } => "DELIVERY_EXHAUSTED",
            Cm11aError::MalformedUpload(_) => "MALFORMED_UPLOAD",
            Cm11aError::UnmappedNibble(_) => "UNMAPPED_NIBBLE",
            Cm11aError::InvalidConfig(_) => "INVALID_CONFIG",
            Cm11aError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for CM11A operations
pub type Result<T> = std::result::Result<T, Cm11aError>;

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<serialport::Error> for Cm11aError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => Cm11aError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                Cm11aError::Io(std::io::Error::new(kind, err.description))
            }
            _ => Cm11aError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}
