//! # UART Transport
//!
//! Drives the module from a microcontroller UART through the `embedded-hal`
//! 0.2 non-blocking serial traits.

use core::fmt::Debug;
use std::time::Instant;

use embedded_hal::serial;
use tracing::warn;

use super::{LineAssembler, Transport, REPLY_SETTLE_MS};
use crate::error::{DriverError, Result};

/// Default reply deadline on a UART link, in milliseconds
pub const DEFAULT_UART_TIMEOUT_MS: u64 = 500;

/// Millisecond time source used for reply deadlines
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin
    fn now_ms(&mut self) -> u64;
}

/// [`Clock`] backed by `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&mut self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Request/response transport over an `embedded-hal` UART
pub struct UartTransport<U, C> {
    uart: U,
    clock: C,
    timeout_ms: u64,
    assembler: LineAssembler,
    closed: bool,
}

impl<U, C> UartTransport<U, C>
where
    U: serial::Read<u8> + serial::Write<u8>,
    <U as serial::Read<u8>>::Error: Debug,
    <U as serial::Write<u8>>::Error: Debug,
    C: Clock,
{
    /// Take ownership of `uart` with a reply deadline of `timeout_ms`
    pub fn new(uart: U, clock: C, timeout_ms: u64) -> Self {
        Self {
            uart,
            clock,
            timeout_ms,
            assembler: LineAssembler::new(),
            closed: false,
        }
    }

    /// Give the peripheral and clock back
    pub fn release(self) -> (U, C) {
        (self.uart, self.clock)
    }

    /// Read until the receive FIFO reports no data
    fn drain_input(&mut self) -> Result<()> {
        for _ in 0..super::MAX_REPLY_LEN {
            match self.uart.read() {
                Ok(_) => {}
                Err(nb::Error::WouldBlock) => return Ok(()),
                Err(nb::Error::Other(e)) => {
                    return Err(DriverError::Serial(format!("UART read failed: {:?}", e)));
                }
            }
        }
        Ok(())
    }

    fn write_command(&mut self, command: &[u8]) -> Result<()> {
        for byte in command {
            nb::block!(self.uart.write(*byte))
                .map_err(|e| DriverError::Serial(format!("UART write failed: {:?}", e)))?;
        }
        nb::block!(self.uart.flush())
            .map_err(|e| DriverError::Serial(format!("UART flush failed: {:?}", e)))
    }
}

impl<U, C> Transport for UartTransport<U, C>
where
    U: serial::Read<u8> + serial::Write<u8>,
    <U as serial::Read<u8>>::Error: Debug,
    <U as serial::Write<u8>>::Error: Debug,
    C: Clock,
{
    fn request(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        if self.closed {
            return Err(DriverError::Serial("UART transport closed".to_string()));
        }

        self.drain_input()?;
        self.write_command(command)?;
        self.assembler.clear();

        let start = self.clock.now_ms();
        let mut last_rx = start;
        let mut received = false;
        loop {
            match self.uart.read() {
                Ok(byte) => {
                    self.assembler.extend(&[byte])?;
                    received = true;
                    continue;
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => {
                    return Err(DriverError::Serial(format!("UART read failed: {:?}", e)));
                }
            }

            let now = self.clock.now_ms();
            if received {
                last_rx = now;
                received = false;
            }

            let timed_out = now.saturating_sub(start) >= self.timeout_ms;
            if self.assembler.is_complete()
                && (timed_out || now.saturating_sub(last_rx) >= REPLY_SETTLE_MS)
            {
                return Ok(self.assembler.take());
            }

            if timed_out {
                warn!("No reply on UART within {} ms", self.timeout_ms);
                return Err(DriverError::CommunicationTimeout(self.timeout_ms));
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
