//! Configuration types for the CM11A driver
//!
//! The bridge talks 4800 baud, 8N1. Only the port path normally needs to be
//! set; everything else has a working default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use x10_core::HouseCode;

use crate::error::{Cm11aError, Result};

/// Default baud rate of the CM11A
pub const DEFAULT_BAUD_RATE: u32 = 4800;

/// Default number of data bits
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Default retry budget per delivery or clock request
pub const DEFAULT_MAXIMUM_ATTEMPTS: u32 = 20;

/// Default per-byte read timeout
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;

/// Brightness steps representable in an outbound frame header
pub const OUTPUT_BRIGHTNESS_LEVELS: u8 = 22;

/// Brightness steps used by the bridge in uploaded buffers
pub const INPUT_BRIGHTNESS_LEVELS: u8 = 210;

/// Main configuration for the CM11A driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cm11aConfig {
    /// Serial line settings
    #[serde(default)]
    pub serial: SerialConfig,

    /// Attempts per delivery or clock request before giving up
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,

    /// How long to wait for any single byte from the bridge
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,

    /// House code the bridge reports status for
    #[serde(default = "default_monitored_house_code")]
    pub monitored_house_code: HouseCode,
}

fn default_maximum_attempts() -> u32 {
    DEFAULT_MAXIMUM_ATTEMPTS
}

fn default_read_timeout() -> Duration {
    Duration::from_millis(DEFAULT_READ_TIMEOUT_MS)
}

fn default_monitored_house_code() -> HouseCode {
    HouseCode::A
}

impl Default for Cm11aConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            maximum_attempts: DEFAULT_MAXIMUM_ATTEMPTS,
            read_timeout: default_read_timeout(),
            monitored_house_code: HouseCode::A,
        }
    }
}

impl Cm11aConfig {
    /// Start building a configuration from the defaults
    pub fn builder() -> Cm11aConfigBuilder {
        Cm11aConfigBuilder::new()
    }

    /// Reject settings the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.maximum_attempts == 0 {
            return Err(Cm11aError::InvalidConfig(
                "maximum_attempts must be at least 1".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(Cm11aError::InvalidConfig(
                "read_timeout must be non-zero".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(Cm11aError::InvalidConfig(
                "baud_rate must be non-zero".to_string(),
            ));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(Cm11aError::InvalidConfig(format!(
                "data_bits must be 5 through 8, got {}",
                self.serial.data_bits
            )));
        }
        Ok(())
    }
}

/// Serial line settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Path to serial port (e.g., /dev/ttyUSB0, COM3)
    pub port: PathBuf,

    /// Baud rate (default: 4800)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Stop bits (default: one)
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Parity (default: none)
    #[serde(default)]
    pub parity: Parity,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            stop_bits: StopBits::default(),
            parity: Parity::default(),
        }
    }
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Builder for Cm11aConfig
#[derive(Debug, Default)]
pub struct Cm11aConfigBuilder {
    config: Cm11aConfig,
}

impl Cm11aConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set serial port path
    pub fn serial_port(mut self, port: impl Into<PathBuf>) -> Self {
        self.config.serial.port = port.into();
        self
    }

    /// Set baud rate
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.serial.baud_rate = baud_rate;
        self
    }

    /// Set data bits
    pub fn data_bits(mut self, data_bits: u8) -> Self {
        self.config.serial.data_bits = data_bits;
        self
    }

    /// Set stop bits
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.config.serial.stop_bits = stop_bits;
        self
    }

    /// Set parity
    pub fn parity(mut self, parity: Parity) -> Self {
        self.config.serial.parity = parity;
        self
    }

    /// Set the retry budget
    pub fn maximum_attempts(mut self, attempts: u32) -> Self {
        self.config.maximum_attempts = attempts;
        self
    }

    /// Set the per-byte read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the monitored house code
    pub fn monitored_house_code(mut self, house: HouseCode) -> Self {
        self.config.monitored_house_code = house;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Cm11aConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Cm11aConfig::default();
        assert_eq!(config.serial.baud_rate, 4800);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.stop_bits, StopBits::One);
        assert_eq!(config.serial.parity, Parity::None);
        assert_eq!(config.maximum_attempts, 20);
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.monitored_house_code, HouseCode::A);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = Cm11aConfigBuilder::new()
            .serial_port("/dev/ttyS1")
            .maximum_attempts(5)
            .read_timeout(Duration::from_millis(500))
            .monitored_house_code(HouseCode::M)
            .build();

        assert_eq!(config.serial.port, PathBuf::from("/dev/ttyS1"));
        assert_eq!(config.maximum_attempts, 5);
        assert_eq!(config.monitored_house_code, HouseCode::M);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = Cm11aConfigBuilder::new().maximum_attempts(0).build();
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Cm11aConfigBuilder::new()
            .read_timeout(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "serial": { "port": "/dev/ttyUSB1" },
            "read_timeout": "750ms",
            "monitored_house_code": "C"
        }"#;
        let config: Cm11aConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.serial.port, PathBuf::from("/dev/ttyUSB1"));
        assert_eq!(config.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.read_timeout, Duration::from_millis(750));
        assert_eq!(config.monitored_house_code, HouseCode::C);
        assert_eq!(config.maximum_attempts, DEFAULT_MAXIMUM_ATTEMPTS);
    }
}
