//! # AT Command Encoder
//!
//! Turns validated settings and driver operations into command lines.

use super::protocol::*;
use crate::device::state::Setting;

/// Encode a command into the bytes written to the module
///
/// # Examples
///
/// ```
/// use lora_node::at::encoder::encode_command;
/// use lora_node::at::protocol::{Command, Opcode};
///
/// assert_eq!(encode_command(&Command::Probe), b"AT\r\n");
/// assert_eq!(encode_command(&Command::Query(Opcode::Join)), b"AT+JOIN?\r\n");
/// ```
pub fn encode_command(command: &Command) -> Vec<u8> {
    let body = match command {
        Command::Probe => String::new(),
        Command::Set { opcode, value } => format!("+{}={}", opcode, value),
        Command::Query(opcode) => format!("+{}?", opcode),
        Command::Exec(opcode) => format!("+{}", opcode),
    };

    let mut line = Vec::with_capacity(AT_PREFIX.len() + body.len() + LINE_TERMINATOR.len());
    line.extend_from_slice(AT_PREFIX.as_bytes());
    line.extend_from_slice(body.as_bytes());
    line.extend_from_slice(LINE_TERMINATOR);
    line
}

/// Build the `AT+<OPCODE>=<value>` command for a setting
///
/// Numeric values are decimal; keys and addresses are passed through as the
/// upper-case hex the validator already checked.
pub fn setting_command(setting: &Setting) -> Command {
    match setting {
        Setting::Mode(mode) => Command::set(Opcode::LoraMode, mode.as_str()),
        Setting::Region(region) => Command::set(Opcode::Region, region.as_str()),
        Setting::Frequency(hz) => Command::set(Opcode::Freqs, hz.to_string()),
        Setting::TransmitPower(dbm) => Command::set(Opcode::Eirp, dbm.to_string()),
        Setting::Bandwidth(hz) => Command::set(Opcode::Bw, hz.to_string()),
        Setting::SpreadingFactor(sf) => Command::set(Opcode::Sf, sf.to_string()),
        Setting::DataRate(dr) => Command::set(Opcode::DataRate, dr.to_string()),
        Setting::DevType(class) => Command::set(Opcode::Class, class.as_str()),
        Setting::SubBand(band) => Command::set(Opcode::SubBand, band.to_string()),
        Setting::PacketType(packet_type) => Command::set(Opcode::UplinkType, packet_type.as_str()),
        Setting::JoinType(join_type) => Command::set(Opcode::JoinType, join_type.as_str()),
        Setting::AppEui(eui) => Command::set(Opcode::JoinEui, eui.as_str()),
        Setting::AppKey(key) => Command::set(Opcode::AppKey, key.as_str()),
        Setting::DevAddr(addr) => Command::set(Opcode::DevAddr, addr.as_str()),
        Setting::AppSKey(key) => Command::set(Opcode::AppSKey, key.as_str()),
        Setting::NwkSKey(key) => Command::set(Opcode::NwkSKey, key.as_str()),
        Setting::Adr(enabled) => Command::set(Opcode::Adr, if *enabled { "1" } else { "0" }),
    }
}

/// `AT+SEND=<frame hex>`
pub fn send_command(frame_hex: &str) -> Command {
    Command::set(Opcode::Send, frame_hex)
}

/// `AT+RECV=1`, switching the module to continuous receive
pub fn receive_mode_command() -> Command {
    Command::set(Opcode::Recv, "1")
}

/// `AT+JOIN=1`, starting the module (and the OTAA join in LoRaWAN mode)
pub fn join_command() -> Command {
    Command::set(Opcode::Join, "1")
}
