//! # Telemetry Module
//!
//! Handles frame logging to JSONL files with rotation.
//!
//! This module handles:
//! - Recording every frame sent or received by the node
//! - Formatting as JSONL (JSON Lines) with UTC timestamps
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;

pub use logger::{Direction, FrameLogger, FrameRecord};
