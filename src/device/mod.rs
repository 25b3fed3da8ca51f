//! # Device Model
//!
//! Everything the driver knows about the module without talking to it.
//!
//! This module handles:
//! - Per-region limits (frequency, power, data rate, sub-bands)
//! - The committed configuration and session state
//! - Validation of a proposed change before it is sent

pub mod region;
pub mod state;
pub mod validator;

pub use region::{Region, RegionLimits};
pub use state::{DeviceClass, DeviceState, Field, JoinState, JoinType, Mode, PacketType, Setting};
