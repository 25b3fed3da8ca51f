//! # AT Command Codec
//!
//! Text protocol spoken by the LoRa node module.
//!
//! This module handles:
//! - Opcode tokens and the configurable reply dialect
//! - Encoding settings and control operations into command lines
//! - Classifying replies into values or typed device errors
//! - Extracting received frames from `AT+RECV?` replies

pub mod protocol;
pub mod encoder;
pub mod decoder;
