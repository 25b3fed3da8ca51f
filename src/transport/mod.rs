//! # Transport Module
//!
//! Exclusive byte-stream link to the node module.
//!
//! This module handles:
//! - The blocking request/response [`Transport`] seam used by the driver
//! - Reply assembly up to the line terminator
//! - Host serial ports ([`serial::SerialTransport`])
//! - Embedded UART peripherals ([`uart::UartTransport`])

pub mod serial;
pub mod uart;

use bytes::BytesMut;

use crate::at::protocol::LINE_TERMINATOR;
use crate::error::{DriverError, Result};

/// Upper bound on a single reply, in bytes
pub const MAX_REPLY_LEN: usize = 1024;

/// Idle time after a terminated line before the reply is considered whole
///
/// Multi-line replies (`+RECV=OK` followed by the frame) can arrive in
/// separate reads.
pub const REPLY_SETTLE_MS: u64 = 50;

/// Blocking request/response link to the module
///
/// One call is one round trip: stale input is discarded, `command` is
/// written, and the reply is read until a terminator closes a non-blank
/// line and the link has then stayed idle for [`REPLY_SETTLE_MS`] (or the
/// deadline passes with the reply complete). Implementations return
/// `CommunicationTimeout` when the deadline passes with no complete reply
/// and never retry on their own.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Write `command` and return the terminated reply
    fn request(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Release the underlying resource
    ///
    /// Later requests fail with `Serial`. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Accumulates reply bytes until a terminated, non-blank reply is present
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: BytesMut,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(128),
        }
    }

    /// Drop any partial reply
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append bytes read from the link
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the reply grows beyond [`MAX_REPLY_LEN`]
    pub fn extend(&mut self, chunk: &[u8]) -> Result<()> {
        if self.buffer.len() + chunk.len() > MAX_REPLY_LEN {
            self.buffer.clear();
            return Err(DriverError::Protocol(format!(
                "reply exceeds {} bytes without terminator",
                MAX_REPLY_LEN
            )));
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Whether the buffer ends with a terminator that closes a non-blank line
    pub fn is_complete(&self) -> bool {
        self.buffer.ends_with(LINE_TERMINATOR)
            && self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Take the assembled reply, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_waits_for_terminator() {
        let mut assembler = LineAssembler::new();
        assembler.extend(b"+FREQS=8681").unwrap();
        assert!(!assembler.is_complete());
        assembler.extend(b"00000\r").unwrap();
        assert!(!assembler.is_complete());
        assembler.extend(b"\n").unwrap();
        assert!(assembler.is_complete());
        assert_eq!(assembler.take(), b"+FREQS=868100000\r\n".to_vec());
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_assembler_ignores_blank_lines() {
        let mut assembler = LineAssembler::new();
        assembler.extend(b"\r\n\r\n").unwrap();
        assert!(!assembler.is_complete());
        assembler.extend(b"OK\r\n").unwrap();
        assert!(assembler.is_complete());
    }

    #[test]
    fn test_assembler_keeps_multi_line_reply() {
        let mut assembler = LineAssembler::new();
        assembler.extend(b"+RECV=OK\r\nThe list is empty!\r\n").unwrap();
        assert!(assembler.is_complete());
        assert_eq!(assembler.len(), 30);
    }

    #[test]
    fn test_assembler_rejects_oversized_reply() {
        let mut assembler = LineAssembler::new();
        let chunk = vec![b'A'; MAX_REPLY_LEN];
        assembler.extend(&chunk).unwrap();
        assert!(matches!(
            assembler.extend(b"B"),
            Err(DriverError::Protocol(_))
        ));
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_scripted_transport_order() {
        let mut transport = mocks::ScriptedTransport::new();
        transport.expect("AT\r\n", "OK\r\n").expect_timeout("AT+REBOOT\r\n");

        assert_eq!(transport.request(b"AT\r\n").unwrap(), b"OK\r\n".to_vec());
        assert!(matches!(
            transport.request(b"AT+REBOOT\r\n"),
            Err(DriverError::CommunicationTimeout(_))
        ));
        assert!(transport.request(b"AT\r\n").is_err());
        assert_eq!(transport.remaining(), 0);
    }
}
