//! # Error Types
//!
//! Custom error types for the LoRa node driver using `thiserror`.
//!
//! The first five variants are the driver's closed set of failure kinds:
//! validator rejections, device rejections, timeouts and addressing
//! problems. The rest cover the plumbing around the core (serial port,
//! configuration, file I/O).

use thiserror::Error;

use crate::at::protocol::ResponseCode;

/// Main error type for the LoRa node driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// Value outside the allowed set, range or length
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A dependent field is unset or the device is in the wrong mode
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// The module answered with an error status
    #[error("device rejected command ({code}): {reason}")]
    DeviceRejected {
        /// Classified response code
        code: ResponseCode,
        /// Raw reply line as received
        reason: String,
    },

    /// No terminated reply arrived within the deadline
    #[error("communication timeout after {0} ms")]
    CommunicationTimeout(u64),

    /// Target node equals the local node or is outside the addressable range
    #[error("addressing error: {0}")]
    AddressingError(String),

    /// Reply did not start with a recognised status token
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serial port / UART errors
    #[error("serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Frame log serialization errors
    #[error("telemetry error: {0}")]
    Telemetry(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the LoRa node driver
pub type Result<T> = std::result::Result<T, DriverError>;
