//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::at::protocol::Dialect;
use crate::device::validator;
use crate::device::{DeviceState, Mode, Region, Setting};
use crate::error::{DriverError, Result};
use crate::transport::serial::SUPPORTED_BAUD_RATES;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub node: NodeConfig,

    #[serde(default)]
    pub lora: LoraConfig,

    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub protocol: Dialect,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// What the demo node does once configured
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Periodically send a message to the peer
    #[default]
    Send,
    /// Poll for messages addressed to this node
    Receive,
}

/// Node identity and demo loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: u8,

    #[serde(default = "default_peer_id")]
    pub peer_id: u8,

    #[serde(default)]
    pub role: Role,

    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    #[serde(default = "default_receive_interval_ms")]
    pub receive_interval_ms: u64,

    /// Wait after reset before configuring the module
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,

    #[serde(default = "default_message")]
    pub message: String,

    /// Read the configuration back from the module after setup
    #[serde(default)]
    pub verbose: bool,
}

/// Radio configuration applied at startup
#[derive(Debug, Deserialize, Clone)]
pub struct LoraConfig {
    #[serde(default = "default_region")]
    pub region: Region,

    #[serde(default = "default_mode")]
    pub mode: Mode,

    #[serde(default = "default_frequency")]
    pub frequency: u32,

    #[serde(default = "default_transmit_power")]
    pub transmit_power: u8,

    #[serde(default = "default_bandwidth")]
    pub bandwidth: u32,

    #[serde(default = "default_spreading_factor")]
    pub spreading_factor: u8,

    /// LoRaWAN only
    #[serde(default)]
    pub data_rate: Option<u8>,
}

/// Frame log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_timeout_ms() -> u64 { 1000 }

fn default_node_id() -> u8 { 1 }
fn default_peer_id() -> u8 { 2 }
fn default_send_interval_ms() -> u64 { 5000 }
fn default_receive_interval_ms() -> u64 { 25 }
fn default_reset_settle_ms() -> u64 { 2000 }
fn default_message() -> String { "Hello".to_string() }

fn default_region() -> Region { Region::EU868 }
fn default_mode() -> Mode { Mode::LoRa }
fn default_frequency() -> u32 { 868_100_000 }
fn default_transmit_power() -> u8 { 14 }
fn default_bandwidth() -> u32 { 125_000 }
fn default_spreading_factor() -> u8 { 9 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            mode: default_mode(),
            frequency: default_frequency(),
            transmit_power: default_transmit_power(),
            bandwidth: default_bandwidth(),
            spreading_factor: default_spreading_factor(),
            data_rate: None,
        }
    }
}

impl LoraConfig {
    /// Settings in the order they must be applied
    ///
    /// Region comes first since frequency and power are checked against it.
    pub fn settings(&self) -> Vec<Setting> {
        let mut settings = vec![
            Setting::Region(self.region),
            Setting::Mode(self.mode),
            Setting::Frequency(self.frequency),
            Setting::TransmitPower(self.transmit_power),
            Setting::Bandwidth(self.bandwidth),
            Setting::SpreadingFactor(self.spreading_factor),
        ];
        if let Some(data_rate) = self.data_rate {
            settings.push(Setting::DataRate(data_rate));
        }
        settings
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_node::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Config` if any value is out of range. Radio settings are
    /// replayed through the driver's validator, so anything the module
    /// would be refused here is refused at load time.
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(config_error("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(config_error(format!(
                "baud_rate must be one of: {}",
                SUPPORTED_BAUD_RATES.map(|b| b.to_string()).join(", ")
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(config_error("timeout_ms must be between 1 and 10000"));
        }

        if self.node.node_id == 0 || self.node.peer_id == 0 {
            return Err(config_error("node_id and peer_id must be between 1 and 255"));
        }

        if self.node.node_id == self.node.peer_id {
            return Err(config_error("peer_id must differ from node_id"));
        }

        if self.node.send_interval_ms == 0 || self.node.receive_interval_ms == 0 {
            return Err(config_error("send and receive intervals must be greater than 0"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(config_error("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(config_error("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(config_error("max_files_to_keep must be greater than 0"));
        }

        let mut state = DeviceState::new(self.node.node_id)?;
        for setting in self.lora.settings() {
            validator::validate(&state, &setting)
                .map_err(|e| config_error(format!("[lora] {}", e)))?;
            state.apply(setting);
        }

        Ok(())
    }
}

fn config_error(msg: impl std::fmt::Display) -> DriverError {
    DriverError::Config(toml::de::Error::custom(msg))
}
