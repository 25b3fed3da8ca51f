//! # Region Table
//!
//! Static per-region limits: frequency bounds, transmit power ceiling,
//! LoRaWAN data-rate range and sub-band availability.
//!
//! Every region-dependent check in the validator reads from this table, so
//! supporting a new region means adding one variant and one row here.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{DriverError, Result};

/// Transmit power must be set in steps of this many dBm
pub const TRANSMIT_POWER_STEP_DBM: u8 = 2;

/// Highest transmit power the module accepts, in dBm
pub const MODULE_MAX_TRANSMIT_POWER_DBM: u8 = 28;

/// Regional frequency plan supported by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Region {
    /// Europe 863-870 MHz
    EU868,
    /// North America 902-928 MHz
    US915,
    /// China 470-510 MHz
    CN470,
}

/// Limits of one regional plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLimits {
    /// Lowest allowed frequency in Hz
    pub frequency_min: u32,

    /// Highest allowed frequency in Hz
    pub frequency_max: u32,

    /// Highest allowed transmit power in dBm
    pub max_transmit_power: u8,

    /// Highest LoRaWAN data rate index (DR0 is always allowed)
    pub max_data_rate: u8,

    /// Highest sub-band index, `None` when the plan has no sub-band selection
    pub max_sub_band: Option<u8>,
}

const EU868_LIMITS: RegionLimits = RegionLimits {
    frequency_min: 863_000_000,
    frequency_max: 870_000_000,
    max_transmit_power: MODULE_MAX_TRANSMIT_POWER_DBM,
    max_data_rate: 5,
    max_sub_band: None,
};

const US915_LIMITS: RegionLimits = RegionLimits {
    frequency_min: 902_000_000,
    frequency_max: 928_000_000,
    max_transmit_power: MODULE_MAX_TRANSMIT_POWER_DBM,
    max_data_rate: 3,
    max_sub_band: Some(15),
};

const CN470_LIMITS: RegionLimits = RegionLimits {
    frequency_min: 470_000_000,
    frequency_max: 510_000_000,
    max_transmit_power: MODULE_MAX_TRANSMIT_POWER_DBM,
    max_data_rate: 5,
    max_sub_band: Some(15),
};

impl Region {
    /// All supported regions
    pub const ALL: [Region; 3] = [Region::EU868, Region::US915, Region::CN470];

    /// Look up this region's row in the region table
    pub fn limits(self) -> &'static RegionLimits {
        match self {
            Region::EU868 => &EU868_LIMITS,
            Region::US915 => &US915_LIMITS,
            Region::CN470 => &CN470_LIMITS,
        }
    }

    /// Wire token used by `AT+REGION`
    pub fn as_str(self) -> &'static str {
        match self {
            Region::EU868 => "EU868",
            Region::US915 => "US915",
            Region::CN470 => "CN470",
        }
    }

    pub fn supports_sub_band(self) -> bool {
        self.limits().max_sub_band.is_some()
    }
}

impl RegionLimits {
    /// Check whether `frequency` (Hz) lies within the plan, bounds inclusive
    pub fn contains_frequency(&self, frequency: u32) -> bool {
        (self.frequency_min..=self.frequency_max).contains(&frequency)
    }

    /// Check whether `power` (dBm) is an allowed setting
    pub fn allows_transmit_power(&self, power: u8) -> bool {
        power <= self.max_transmit_power && power % TRANSMIT_POWER_STEP_DBM == 0
    }

    pub fn allows_data_rate(&self, data_rate: u8) -> bool {
        data_rate <= self.max_data_rate
    }

    pub fn allows_sub_band(&self, sub_band: u8) -> bool {
        self.max_sub_band.is_some_and(|max| sub_band <= max)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Region::ALL
            .into_iter()
            .find(|region| region.as_str() == s)
            .ok_or_else(|| DriverError::InvalidParameter(format!(
                "unknown region '{}', expected one of EU868, US915, CN470", s
            )))
    }
}
