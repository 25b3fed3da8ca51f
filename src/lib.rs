//! # LoRa Node Library
//!
//! Driver for AT-command LoRa/LoRaWAN node modules.
//!
//! This library validates radio and network settings against regional
//! limits, encodes them as `AT+` commands, exchanges them over a serial port
//! or embedded UART, and frames application payloads between node ids.

pub mod at;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod frame;
pub mod telemetry;
pub mod transport;
