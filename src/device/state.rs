//! # Device State
//!
//! In-memory model of the module's configuration and session data.
//!
//! The driver owns exactly one [`DeviceState`] and only changes it through
//! [`DeviceState::apply`] after the module has confirmed the matching
//! command. Anything that fails validation or is rejected by the module
//! never reaches this type.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use super::region::Region;
use crate::error::{DriverError, Result};

/// Bandwidths accepted by `AT+BW`, in Hz
pub const ALLOWED_BANDWIDTHS: [u32; 3] = [125_000, 250_000, 500_000];

/// Smallest spreading factor
pub const SPREADING_FACTOR_MIN: u8 = 7;

/// Largest spreading factor
pub const SPREADING_FACTOR_MAX: u8 = 12;

/// Lowest addressable node id (0 is reserved)
pub const NODE_ID_MIN: u8 = 1;

/// Operating mode of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Mode {
    /// Point-to-point LoRa without a network server
    #[serde(rename = "LORA")]
    LoRa,
    /// LoRaWAN end device
    #[serde(rename = "LORAWAN")]
    LoRaWan,
}

/// LoRaWAN device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    A,
    B,
    C,
}

/// LoRaWAN uplink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Confirmed,
    Unconfirmed,
}

/// LoRaWAN activation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// Over-the-air activation (AppEUI + AppKey)
    Otaa,
    /// Activation by personalization (DevAddr + session keys)
    Abp,
}

/// Join progress as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinState {
    #[default]
    Idle,
    /// OTAA join requested, waiting for the module to report success
    Joining,
    Joined,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::LoRa, Mode::LoRaWan];

    /// Wire token used by `AT+LORAMODE`
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::LoRa => "LORA",
            Mode::LoRaWan => "LORAWAN",
        }
    }
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [DeviceClass::A, DeviceClass::B, DeviceClass::C];

    /// Wire token used by `AT+CLASS`
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::A => "CLASS_A",
            DeviceClass::B => "CLASS_B",
            DeviceClass::C => "CLASS_C",
        }
    }
}

impl PacketType {
    pub const ALL: [PacketType; 2] = [PacketType::Confirmed, PacketType::Unconfirmed];

    /// Wire token used by `AT+UPLINKTYPE`
    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::Confirmed => "CONFIRMED",
            PacketType::Unconfirmed => "UNCONFIRMED",
        }
    }
}

impl JoinType {
    pub const ALL: [JoinType; 2] = [JoinType::Otaa, JoinType::Abp];

    /// Wire token used by `AT+JOINTYPE`
    pub fn as_str(self) -> &'static str {
        match self {
            JoinType::Otaa => "OTAA",
            JoinType::Abp => "ABP",
        }
    }
}

/// Match `s` against the wire tokens of `all`
fn parse_token<T: Copy>(s: &str, all: &[T], token: fn(T) -> &'static str, what: &str) -> Result<T> {
    all.iter().copied().find(|v| token(*v) == s).ok_or_else(|| {
        let allowed: Vec<&str> = all.iter().map(|v| token(*v)).collect();
        DriverError::InvalidParameter(format!(
            "invalid {} '{}', allowed: {}",
            what,
            s,
            allowed.join(", ")
        ))
    })
}

impl FromStr for Mode {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        parse_token(s, &Mode::ALL, Mode::as_str, "LoRa mode")
    }
}

impl FromStr for DeviceClass {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        parse_token(s, &DeviceClass::ALL, DeviceClass::as_str, "device class")
    }
}

impl FromStr for PacketType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        parse_token(s, &PacketType::ALL, PacketType::as_str, "packet type")
    }
}

impl FromStr for JoinType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        parse_token(s, &JoinType::ALL, JoinType::as_str, "join type")
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single configuration change, tagged by the field it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    Mode(Mode),
    Region(Region),
    /// Hz
    Frequency(u32),
    /// dBm
    TransmitPower(u8),
    /// Hz
    Bandwidth(u32),
    SpreadingFactor(u8),
    DataRate(u8),
    DevType(DeviceClass),
    SubBand(u8),
    PacketType(PacketType),
    JoinType(JoinType),
    AppEui(String),
    AppKey(String),
    DevAddr(String),
    AppSKey(String),
    NwkSKey(String),
    Adr(bool),
}

/// Field identifier of a [`Setting`], without the candidate value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Mode,
    Region,
    Frequency,
    TransmitPower,
    Bandwidth,
    SpreadingFactor,
    DataRate,
    DevType,
    SubBand,
    PacketType,
    JoinType,
    AppEui,
    AppKey,
    DevAddr,
    AppSKey,
    NwkSKey,
    Adr,
}

impl Setting {
    pub fn field(&self) -> Field {
        match self {
            Setting::Mode(_) => Field::Mode,
            Setting::Region(_) => Field::Region,
            Setting::Frequency(_) => Field::Frequency,
            Setting::TransmitPower(_) => Field::TransmitPower,
            Setting::Bandwidth(_) => Field::Bandwidth,
            Setting::SpreadingFactor(_) => Field::SpreadingFactor,
            Setting::DataRate(_) => Field::DataRate,
            Setting::DevType(_) => Field::DevType,
            Setting::SubBand(_) => Field::SubBand,
            Setting::PacketType(_) => Field::PacketType,
            Setting::JoinType(_) => Field::JoinType,
            Setting::AppEui(_) => Field::AppEui,
            Setting::AppKey(_) => Field::AppKey,
            Setting::DevAddr(_) => Field::DevAddr,
            Setting::AppSKey(_) => Field::AppSKey,
            Setting::NwkSKey(_) => Field::NwkSKey,
            Setting::Adr(_) => Field::Adr,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Mode => "LoRa mode",
            Field::Region => "region",
            Field::Frequency => "frequency",
            Field::TransmitPower => "transmit power",
            Field::Bandwidth => "bandwidth",
            Field::SpreadingFactor => "spreading factor",
            Field::DataRate => "data rate",
            Field::DevType => "device class",
            Field::SubBand => "sub-band",
            Field::PacketType => "packet type",
            Field::JoinType => "join type",
            Field::AppEui => "AppEUI",
            Field::AppKey => "AppKey",
            Field::DevAddr => "DevAddr",
            Field::AppSKey => "AppSKey",
            Field::NwkSKey => "NwkSKey",
            Field::Adr => "ADR",
        };
        f.write_str(name)
    }
}

/// Driver-side model of the module configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub node_id: u8,
    pub mode: Option<Mode>,
    pub region: Option<Region>,
    pub frequency: Option<u32>,
    pub transmit_power: Option<u8>,
    pub bandwidth: Option<u32>,
    pub spreading_factor: Option<u8>,
    pub data_rate: Option<u8>,
    pub dev_type: Option<DeviceClass>,
    pub sub_band: Option<u8>,
    pub packet_type: Option<PacketType>,
    pub join_type: Option<JoinType>,
    pub app_eui: Option<String>,
    pub app_key: Option<String>,
    pub dev_addr: Option<String>,
    pub app_skey: Option<String>,
    pub nwk_skey: Option<String>,
    pub adr_enabled: bool,
    pub receive_mode: bool,

    /// Last join status reported by the module
    pub joined: bool,
    pub join_state: JoinState,
}

impl DeviceState {
    /// Create an empty state for the node `node_id`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `node_id` is 0
    pub fn new(node_id: u8) -> Result<Self> {
        if node_id < NODE_ID_MIN {
            return Err(DriverError::InvalidParameter(format!(
                "node id must be between {} and {}, got {}",
                NODE_ID_MIN,
                u8::MAX,
                node_id
            )));
        }

        Ok(Self {
            node_id,
            mode: None,
            region: None,
            frequency: None,
            transmit_power: None,
            bandwidth: None,
            spreading_factor: None,
            data_rate: None,
            dev_type: None,
            sub_band: None,
            packet_type: None,
            join_type: None,
            app_eui: None,
            app_key: None,
            dev_addr: None,
            app_skey: None,
            nwk_skey: None,
            adr_enabled: false,
            receive_mode: false,
            joined: false,
            join_state: JoinState::Idle,
        })
    }

    /// Commit a setting the module has acknowledged
    ///
    /// Switching region drops the region-relative fields; switching join
    /// type drops the credentials of the method that no longer applies.
    /// Leaving LoRaWAN mode drops all LoRaWAN network and session state.
    pub(crate) fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::Mode(mode) => {
                if self.mode != Some(mode) {
                    if mode == Mode::LoRa {
                        self.clear_lorawan();
                    }
                    self.joined = false;
                    self.join_state = JoinState::Idle;
                }
                self.mode = Some(mode);
            }
            Setting::Region(region) => {
                if self.region != Some(region) {
                    self.frequency = None;
                    self.transmit_power = None;
                    self.data_rate = None;
                    self.sub_band = None;
                }
                self.region = Some(region);
            }
            Setting::Frequency(hz) => self.frequency = Some(hz),
            Setting::TransmitPower(dbm) => self.transmit_power = Some(dbm),
            Setting::Bandwidth(hz) => self.bandwidth = Some(hz),
            Setting::SpreadingFactor(sf) => self.spreading_factor = Some(sf),
            Setting::DataRate(dr) => self.data_rate = Some(dr),
            Setting::DevType(class) => self.dev_type = Some(class),
            Setting::SubBand(band) => self.sub_band = Some(band),
            Setting::PacketType(packet_type) => self.packet_type = Some(packet_type),
            Setting::JoinType(join_type) => {
                if self.join_type != Some(join_type) {
                    match join_type {
                        JoinType::Otaa => {
                            self.dev_addr = None;
                            self.app_skey = None;
                            self.nwk_skey = None;
                        }
                        JoinType::Abp => {
                            self.app_eui = None;
                            self.app_key = None;
                        }
                    }
                    self.joined = false;
                    self.join_state = JoinState::Idle;
                }
                self.join_type = Some(join_type);
            }
            Setting::AppEui(eui) => self.app_eui = Some(eui),
            Setting::AppKey(key) => self.app_key = Some(key),
            Setting::DevAddr(addr) => self.dev_addr = Some(addr),
            Setting::AppSKey(key) => self.app_skey = Some(key),
            Setting::NwkSKey(key) => self.nwk_skey = Some(key),
            Setting::Adr(enabled) => self.adr_enabled = enabled,
        }
    }

    fn clear_lorawan(&mut self) {
        self.data_rate = None;
        self.dev_type = None;
        self.sub_band = None;
        self.packet_type = None;
        self.join_type = None;
        self.app_eui = None;
        self.app_key = None;
        self.dev_addr = None;
        self.app_skey = None;
        self.nwk_skey = None;
        self.adr_enabled = false;
    }
}
