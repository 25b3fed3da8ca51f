//! # Serial Transport
//!
//! Host serial port link to the node module (USB adapter or on-board UART
//! exposed as a tty).
//!
//! The port is opened 8N1 without flow control. Reads use a short port
//! timeout so the overall reply deadline can be enforced here.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{LineAssembler, Transport, REPLY_SETTLE_MS};
use crate::error::{DriverError, Result};

/// Default baud rate of the node module
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Baud rates the module can be configured for
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Default deadline for one reply
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Port read timeout, and so the granularity of the reply deadline
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const READ_CHUNK_SIZE: usize = 64;

/// Byte-level operations on an open port
pub trait PortIo: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Read whatever is available, waiting at most one poll interval
    ///
    /// Returns `Ok(0)` or a `TimedOut`/`WouldBlock` error when nothing arrived.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard unread input
    fn clear_input(&mut self) -> io::Result<()>;
}

/// An OS serial port
pub struct SystemPort {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl SystemPort {
    /// Open `path` at `baud_rate`, 8N1
    ///
    /// # Errors
    ///
    /// Returns `Serial` if the port does not exist or cannot be configured
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| DriverError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(Self { port })
    }
}

impl PortIo for SystemPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Request/response transport over a serial port
///
/// Owns the port; it is released on [`Transport::close`] or when the
/// transport is dropped.
pub struct SerialTransport<P: PortIo = SystemPort> {
    port: Option<P>,
    port_name: String,
    timeout: Duration,
    assembler: LineAssembler,
}

impl<P: PortIo> std::fmt::Debug for SerialTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("timeout", &self.timeout)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialTransport<SystemPort> {
    /// Open the serial port at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g. "/dev/ttyUSB0" or "COM3")
    /// * `baud_rate` - One of [`SUPPORTED_BAUD_RATES`]
    /// * `timeout` - Deadline for each reply
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unsupported baud rate and `Serial`
    /// if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_node::transport::serial::{SerialTransport, DEFAULT_TIMEOUT};
    ///
    /// let transport = SerialTransport::open("/dev/ttyUSB0", 9600, DEFAULT_TIMEOUT)?;
    /// println!("Connected to: {}", transport.port_name());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(DriverError::InvalidParameter(format!(
                "unsupported baud rate {}, allowed: {:?}",
                baud_rate, SUPPORTED_BAUD_RATES
            )));
        }

        let port = SystemPort::open(path, baud_rate)?;
        info!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(Self::with_port(port, path, timeout))
    }
}

impl<P: PortIo> SerialTransport<P> {
    /// Wrap an already open port
    pub fn with_port(port: P, port_name: &str, timeout: Duration) -> Self {
        Self {
            port: Some(port),
            port_name: port_name.to_string(),
            timeout,
            assembler: LineAssembler::new(),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl<P: PortIo> Transport for SerialTransport<P> {
    fn request(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| DriverError::Serial(format!("{} is closed", self.port_name)))?;

        port.clear_input()
            .map_err(|e| DriverError::Serial(format!("Failed to clear input: {}", e)))?;
        port.write_all(command)
            .map_err(|e| DriverError::Serial(format!("Failed to write command: {}", e)))?;
        port.flush()
            .map_err(|e| DriverError::Serial(format!("Failed to flush serial port: {}", e)))?;

        self.assembler.clear();
        let started = Instant::now();
        let deadline = started + self.timeout;
        let settle = Duration::from_millis(REPLY_SETTLE_MS);
        let mut last_rx = started;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    self.assembler.extend(&chunk[..n])?;
                    last_rx = Instant::now();
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    return Err(DriverError::Serial(format!("Failed to read reply: {}", e)));
                }
            }

            let now = Instant::now();
            if self.assembler.is_complete() && (now >= deadline || now - last_rx >= settle) {
                return Ok(self.assembler.take());
            }

            if now >= deadline {
                if !self.assembler.is_empty() {
                    debug!("Discarding {} bytes of partial reply", self.assembler.len());
                }
                warn!(
                    "No reply from {} within {} ms",
                    self.port_name,
                    self.timeout.as_millis()
                );
                return Err(DriverError::CommunicationTimeout(
                    self.timeout.as_millis() as u64
                ));
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }
}
