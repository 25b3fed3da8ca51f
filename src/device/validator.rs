//! # Configuration Validator
//!
//! Pure checks run before any command is sent. Given the current
//! [`DeviceState`] and a candidate [`Setting`], [`validate`] either accepts
//! (`Ok(())`) or rejects with `PreconditionNotMet` / `InvalidParameter`.
//!
//! Preconditions are a table keyed by [`Field`] and are checked before the
//! value itself, so a key set in the wrong join type is reported as a
//! precondition failure even when the key is also malformed.

use tracing::debug;

use super::region::Region;
use super::state::{
    DeviceState, Field, JoinType, Mode, Setting, ALLOWED_BANDWIDTHS, SPREADING_FACTOR_MAX,
    SPREADING_FACTOR_MIN,
};
use crate::error::{DriverError, Result};

/// AppEUI / JoinEUI length in hex characters (64 bit)
pub const APP_EUI_HEX_LEN: usize = 16;

/// AppKey length in hex characters (128 bit)
pub const APP_KEY_HEX_LEN: usize = 32;

/// DevAddr length in hex characters (32 bit)
pub const DEV_ADDR_HEX_LEN: usize = 8;

/// AppSKey / NwkSKey length in hex characters (128 bit)
pub const SESSION_KEY_HEX_LEN: usize = 32;

/// A condition on the current state that must hold before a field is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// A region has been committed
    RegionSet,
    /// The module is in LoRaWAN mode
    LoRaWanMode,
    /// The committed join type is the given one
    JoinTypeIs(JoinType),
    /// The committed region offers sub-band selection
    SubBandRegion,
}

const NONE: &[Precondition] = &[];
const REGIONAL: &[Precondition] = &[Precondition::RegionSet];
const LORAWAN: &[Precondition] = &[Precondition::LoRaWanMode];
const LORAWAN_REGIONAL: &[Precondition] = &[Precondition::LoRaWanMode, Precondition::RegionSet];
const SUB_BAND: &[Precondition] = &[
    Precondition::LoRaWanMode,
    Precondition::RegionSet,
    Precondition::SubBandRegion,
];
const OTAA_CREDENTIAL: &[Precondition] = &[
    Precondition::LoRaWanMode,
    Precondition::JoinTypeIs(JoinType::Otaa),
];
const ABP_CREDENTIAL: &[Precondition] = &[
    Precondition::LoRaWanMode,
    Precondition::JoinTypeIs(JoinType::Abp),
];

impl Field {
    /// Preconditions for setting this field, checked in order
    pub fn preconditions(self) -> &'static [Precondition] {
        match self {
            Field::Mode | Field::Region | Field::Bandwidth | Field::SpreadingFactor => NONE,
            Field::Frequency | Field::TransmitPower => REGIONAL,
            Field::DataRate => LORAWAN_REGIONAL,
            Field::SubBand => SUB_BAND,
            Field::DevType | Field::PacketType | Field::JoinType | Field::Adr => LORAWAN,
            Field::AppEui | Field::AppKey => OTAA_CREDENTIAL,
            Field::DevAddr | Field::AppSKey | Field::NwkSKey => ABP_CREDENTIAL,
        }
    }
}

/// Validate `setting` against `state`
///
/// # Errors
///
/// * `PreconditionNotMet` - a dependent field is unset or has the wrong value
/// * `InvalidParameter` - the value is outside the allowed set, range or format
pub fn validate(state: &DeviceState, setting: &Setting) -> Result<()> {
    let field = setting.field();

    for &precondition in field.preconditions() {
        check_precondition(state, field, precondition)?;
    }

    check_value(state, setting).map_err(|e| {
        debug!("Rejected {}: {}", field, e);
        e
    })
}

fn check_precondition(state: &DeviceState, field: Field, precondition: Precondition) -> Result<()> {
    match precondition {
        Precondition::RegionSet => {
            require_region(state, field)?;
        }
        Precondition::LoRaWanMode => require_mode(state, Mode::LoRaWan, &field.to_string())?,
        Precondition::JoinTypeIs(expected) => match state.join_type {
            None => {
                return Err(not_met(format!("join type must be set before {}", field)));
            }
            Some(actual) if actual != expected => {
                return Err(not_met(format!(
                    "{} requires join type {}, current join type is {}",
                    field, expected, actual
                )));
            }
            Some(_) => {}
        },
        Precondition::SubBandRegion => {
            let region = require_region(state, field)?;
            if !region.supports_sub_band() {
                return Err(not_met(format!(
                    "sub-band selection is only available for US915 and CN470, region is {}",
                    region
                )));
            }
        }
    }
    Ok(())
}

fn check_value(state: &DeviceState, setting: &Setting) -> Result<()> {
    match setting {
        Setting::Mode(_)
        | Setting::Region(_)
        | Setting::DevType(_)
        | Setting::PacketType(_)
        | Setting::JoinType(_)
        | Setting::Adr(_) => Ok(()),

        Setting::Frequency(hz) => {
            let region = require_region(state, Field::Frequency)?;
            let limits = region.limits();
            if !limits.contains_frequency(*hz) {
                return Err(invalid(format!(
                    "frequency {} Hz out of range for region {}, valid range: {} - {} Hz",
                    hz, region, limits.frequency_min, limits.frequency_max
                )));
            }
            Ok(())
        }

        Setting::TransmitPower(dbm) => {
            let region = require_region(state, Field::TransmitPower)?;
            let limits = region.limits();
            if !limits.allows_transmit_power(*dbm) {
                return Err(invalid(format!(
                    "transmit power {} dBm not allowed in {}, expected an even value 0 - {}",
                    dbm, region, limits.max_transmit_power
                )));
            }
            Ok(())
        }

        Setting::Bandwidth(hz) => {
            if !ALLOWED_BANDWIDTHS.contains(hz) {
                return Err(invalid(format!(
                    "bandwidth {} Hz not allowed, expected one of {:?}",
                    hz, ALLOWED_BANDWIDTHS
                )));
            }
            Ok(())
        }

        Setting::SpreadingFactor(sf) => {
            if !(SPREADING_FACTOR_MIN..=SPREADING_FACTOR_MAX).contains(sf) {
                return Err(invalid(format!(
                    "spreading factor {} out of range {} - {}",
                    sf, SPREADING_FACTOR_MIN, SPREADING_FACTOR_MAX
                )));
            }
            Ok(())
        }

        Setting::DataRate(dr) => {
            let region = require_region(state, Field::DataRate)?;
            let limits = region.limits();
            if !limits.allows_data_rate(*dr) {
                return Err(invalid(format!(
                    "data rate {} not valid for region {}, expected 0 - {}",
                    dr, region, limits.max_data_rate
                )));
            }
            Ok(())
        }

        Setting::SubBand(band) => {
            let region = require_region(state, Field::SubBand)?;
            let limits = region.limits();
            if !limits.allows_sub_band(*band) {
                return Err(invalid(format!(
                    "sub-band {} out of range for region {}, expected 0 - {}",
                    band,
                    region,
                    limits.max_sub_band.unwrap_or(0)
                )));
            }
            Ok(())
        }

        Setting::AppEui(value) => check_hex(Field::AppEui, value, APP_EUI_HEX_LEN),
        Setting::AppKey(value) => check_hex(Field::AppKey, value, APP_KEY_HEX_LEN),
        Setting::DevAddr(value) => check_hex(Field::DevAddr, value, DEV_ADDR_HEX_LEN),
        Setting::AppSKey(value) => check_hex(Field::AppSKey, value, SESSION_KEY_HEX_LEN),
        Setting::NwkSKey(value) => check_hex(Field::NwkSKey, value, SESSION_KEY_HEX_LEN),
    }
}

/// Check that `value` is exactly `len` characters from `[0-9A-F]`
///
/// Lower-case digits are rejected; the module expects upper-case keys.
pub fn check_hex(field: Field, value: &str, len: usize) -> Result<()> {
    if value.len() != len {
        return Err(invalid(format!(
            "{} must be {} hex characters, got {}",
            field,
            len,
            value.len()
        )));
    }

    if let Some(c) = value.chars().find(|c| !matches!(c, '0'..='9' | 'A'..='F')) {
        return Err(invalid(format!(
            "{} must contain only 0-9 and A-F, found '{}'",
            field, c
        )));
    }

    Ok(())
}

/// Require a committed mode equal to `expected`
pub fn require_mode(state: &DeviceState, expected: Mode, operation: &str) -> Result<()> {
    match state.mode {
        None => Err(not_met(format!("LoRa mode must be set before {}", operation))),
        Some(actual) if actual != expected => Err(not_met(format!(
            "{} requires mode {}, current mode is {}",
            operation, expected, actual
        ))),
        Some(_) => Ok(()),
    }
}

fn require_region(state: &DeviceState, field: Field) -> Result<Region> {
    state
        .region
        .ok_or_else(|| not_met(format!("region must be set before {}", field)))
}

/// Check that the module can be started in `mode`
///
/// LoRaWAN additionally needs the credentials of the selected join type.
pub fn check_startable(state: &DeviceState, mode: Mode) -> Result<()> {
    require_mode(state, mode, "starting the device")?;

    if state.region.is_none() {
        return Err(not_met("region must be set before starting the device"));
    }

    if mode == Mode::LoRa {
        return Ok(());
    }

    let missing: Vec<Field> = match state.join_type {
        None => {
            return Err(not_met("join type must be set before starting in LORAWAN mode"));
        }
        Some(JoinType::Otaa) => [
            (Field::AppEui, state.app_eui.is_some()),
            (Field::AppKey, state.app_key.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| !present)
        .map(|(field, _)| field)
        .collect(),
        Some(JoinType::Abp) => [
            (Field::DevAddr, state.dev_addr.is_some()),
            (Field::AppSKey, state.app_skey.is_some()),
            (Field::NwkSKey, state.nwk_skey.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| !present)
        .map(|(field, _)| field)
        .collect(),
    };

    if let Some(field) = missing.first() {
        return Err(not_met(format!(
            "{} must be set before joining ({} missing field(s))",
            field,
            missing.len()
        )));
    }

    Ok(())
}

/// Check that data can be sent in the current mode
pub fn check_can_send(state: &DeviceState) -> Result<()> {
    match state.mode {
        None => Err(not_met("LoRa mode must be set before sending data")),
        Some(Mode::LoRaWan) if state.join_type.is_none() => Err(not_met(
            "join type must be set before sending data in LORAWAN mode",
        )),
        Some(_) => Ok(()),
    }
}

fn invalid(msg: impl Into<String>) -> DriverError {
    DriverError::InvalidParameter(msg.into())
}

fn not_met(msg: impl Into<String>) -> DriverError {
    DriverError::PreconditionNotMet(msg.into())
}
