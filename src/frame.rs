//! # Data Frames
//!
//! Application payloads exchanged between two node ids.
//!
//! On the wire a frame is upper-case hex without separators: one byte of
//! target id, one byte of source id, then the payload. The order of the two
//! id bytes follows the dialect's [`FrameOrder`].

use crate::at::protocol::FrameOrder;
use crate::error::{DriverError, Result};

/// Largest payload that fits one frame, in bytes
pub const MAX_PAYLOAD_SIZE: usize = 253;

/// Target and source bytes in front of the payload
pub const FRAME_HEADER_SIZE: usize = 2;

/// A decoded data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub source: u8,
    pub target: u8,
    pub payload: Vec<u8>,
}

/// Outcome of filtering a poll by target id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    /// Frame addressed to the expected target
    Payload(Vec<u8>),
    /// The module had nothing pending
    NoData,
    /// A frame arrived for a different target
    NoMatch(Frame),
}

impl Frame {
    pub fn new(source: u8, target: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            source,
            target,
            payload: payload.into(),
        }
    }

    /// Encode as the hex string carried by `AT+SEND=`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the payload exceeds [`MAX_PAYLOAD_SIZE`]
    ///
    /// # Examples
    ///
    /// ```
    /// use lora_node::at::protocol::FrameOrder;
    /// use lora_node::frame::Frame;
    ///
    /// let frame = Frame::new(1, 2, b"Hello".to_vec());
    /// assert_eq!(frame.encode(FrameOrder::TargetFirst)?, "020148656C6C6F");
    /// # Ok::<(), lora_node::error::DriverError>(())
    /// ```
    pub fn encode(&self, order: FrameOrder) -> Result<String> {
        check_payload_size(self.payload.len())?;

        let (first, second) = match order {
            FrameOrder::TargetFirst => (self.target, self.source),
            FrameOrder::SourceFirst => (self.source, self.target),
        };

        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        bytes.push(first);
        bytes.push(second);
        bytes.extend_from_slice(&self.payload);
        Ok(hex::encode_upper(bytes))
    }

    /// Decode a frame from its hex form
    ///
    /// Lower-case hex is accepted.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` for odd-length or non-hex input, or input shorter
    /// than the two id bytes
    pub fn decode(frame_hex: &str, order: FrameOrder) -> Result<Self> {
        let bytes = hex::decode(frame_hex.trim())
            .map_err(|e| DriverError::Protocol(format!("malformed frame '{}': {}", frame_hex, e)))?;

        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(DriverError::Protocol(format!(
                "frame '{}' is shorter than its {}-byte header",
                frame_hex, FRAME_HEADER_SIZE
            )));
        }

        let (target, source) = match order {
            FrameOrder::TargetFirst => (bytes[0], bytes[1]),
            FrameOrder::SourceFirst => (bytes[1], bytes[0]),
        };

        Ok(Self {
            source,
            target,
            payload: bytes[FRAME_HEADER_SIZE..].to_vec(),
        })
    }

    /// Payload as text, with invalid UTF-8 replaced
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Check that `target` is addressable from node `node_id`
///
/// # Errors
///
/// Returns `AddressingError` for the reserved id 0 or the local id
pub fn check_target(node_id: u8, target: u8) -> Result<()> {
    if target == 0 {
        return Err(DriverError::AddressingError(
            "target id must be between 1 and 255".to_string(),
        ));
    }
    if target == node_id {
        return Err(DriverError::AddressingError(format!(
            "target id {} is the local node id",
            target
        )));
    }
    Ok(())
}

pub fn check_payload_size(len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(DriverError::InvalidParameter(format!(
            "payload of {} bytes exceeds the {}-byte frame limit",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}
