//! # AT Protocol Constants and Types
//!
//! Core definitions for the module's `AT+` command set.
//!
//! Commands are ASCII lines of the form `AT+<OPCODE>[=<value>|?]\r\n`. The
//! liveness probe is a bare `AT\r\n`. Every reply is one line starting with a
//! status token: `OK`, an echo of the opcode (`+FREQS=868100000`) or an
//! error token (`ERROR:2`, `+SEND=FAIL`).

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Prefix of every command
pub const AT_PREFIX: &str = "AT";

/// Line terminator for commands and replies
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Success status token
pub const OK_TOKEN: &str = "OK";

/// Error status token (optionally followed by a reason code)
pub const ERROR_TOKEN: &str = "ERROR";

/// Value token reporting a failed operation (`+SEND=FAIL`)
pub const FAIL_TOKEN: &str = "FAIL";

/// Value tokens reporting a payload queued for transmission
pub const SEND_QUEUED_TOKENS: [&str; 2] = ["QUEUE", "QU"];

/// Marker the module prints when no received frame is pending
pub const DEFAULT_EMPTY_MARKER: &str = "The list is empty!";

/// Command opcodes understood by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    LoraMode,
    Region,
    Freqs,
    Eirp,
    Bw,
    Sf,
    DataRate,
    Class,
    SubBand,
    UplinkType,
    JoinType,
    JoinEui,
    AppKey,
    DevAddr,
    AppSKey,
    NwkSKey,
    Adr,
    Recv,
    Reboot,
    Join,
    Send,
    DevEui,
    NetId,
}

impl Opcode {
    /// Opcode token as written after `AT+`
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::LoraMode => "LORAMODE",
            Opcode::Region => "REGION",
            Opcode::Freqs => "FREQS",
            Opcode::Eirp => "EIRP",
            Opcode::Bw => "BW",
            Opcode::Sf => "SF",
            Opcode::DataRate => "DATARATE",
            Opcode::Class => "CLASS",
            Opcode::SubBand => "SUBBAND",
            Opcode::UplinkType => "UPLINKTYPE",
            Opcode::JoinType => "JOINTYPE",
            Opcode::JoinEui => "JOINEUI",
            Opcode::AppKey => "APPKEY",
            Opcode::DevAddr => "DEVADDR",
            Opcode::AppSKey => "APPSKEY",
            Opcode::NwkSKey => "NWKSKEY",
            Opcode::Adr => "ADR",
            Opcode::Recv => "RECV",
            Opcode::Reboot => "REBOOT",
            Opcode::Join => "JOIN",
            Opcode::Send => "SEND",
            Opcode::DevEui => "DEVEUI",
            Opcode::NetId => "NETID",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One command line, before encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bare `AT`, answered with `OK` by a live module
    Probe,
    /// `AT+<OPCODE>=<value>`
    Set { opcode: Opcode, value: String },
    /// `AT+<OPCODE>?`
    Query(Opcode),
    /// `AT+<OPCODE>`
    Exec(Opcode),
}

impl Command {
    pub fn set(opcode: Opcode, value: impl Into<String>) -> Self {
        Command::Set {
            opcode,
            value: value.into(),
        }
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Command::Probe => None,
            Command::Set { opcode, .. } | Command::Query(opcode) | Command::Exec(opcode) => {
                Some(*opcode)
            }
        }
    }
}

/// Reason attached to an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    UnsupportedCommand,
    InvalidParameter,
    HardwareBusy,
    /// The module itself timed out (e.g. no radio acknowledgement)
    DeviceTimeout,
    /// Error token without a code, or a code outside the vocabulary
    Unrecognized,
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseCode::UnsupportedCommand => "unsupported command",
            ResponseCode::InvalidParameter => "invalid parameter",
            ResponseCode::HardwareBusy => "hardware busy",
            ResponseCode::DeviceTimeout => "timeout at device",
            ResponseCode::Unrecognized => "unrecognized error",
        };
        f.write_str(s)
    }
}

/// Successful reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledgement without a value
    Ok,
    /// Value echoed after `+<OPCODE>=`
    Value(String),
}

/// Field order of a data frame on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrder {
    /// Target id, source id, payload
    #[default]
    TargetFirst,
    /// Source id, target id, payload
    SourceFirst,
}

/// Wire tokens that differ between module firmwares
///
/// The defaults match the tokens observed on the DFRobot node module; any
/// of them can be overridden from the `[protocol]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Text printed by `AT+RECV?` when nothing is pending
    pub empty_marker: String,

    /// Error reason token -> response code
    pub error_codes: HashMap<String, ResponseCode>,

    /// Field order of received and sent frames
    pub frame_order: FrameOrder,
}

impl Default for Dialect {
    fn default() -> Self {
        let error_codes = [
            ("1", ResponseCode::UnsupportedCommand),
            ("UNSUPPORTED", ResponseCode::UnsupportedCommand),
            ("2", ResponseCode::InvalidParameter),
            ("PARAM", ResponseCode::InvalidParameter),
            ("INVALID", ResponseCode::InvalidParameter),
            ("3", ResponseCode::HardwareBusy),
            ("BUSY", ResponseCode::HardwareBusy),
            ("4", ResponseCode::DeviceTimeout),
            ("TIMEOUT", ResponseCode::DeviceTimeout),
        ]
        .into_iter()
        .map(|(token, code)| (token.to_string(), code))
        .collect();

        Self {
            empty_marker: DEFAULT_EMPTY_MARKER.to_string(),
            error_codes,
            frame_order: FrameOrder::default(),
        }
    }
}

impl Dialect {
    /// Classify an error reason token
    pub fn response_code(&self, token: &str) -> ResponseCode {
        self.error_codes
            .get(token)
            .copied()
            .unwrap_or(ResponseCode::Unrecognized)
    }
}
