//! # LoRa Node
//!
//! Demo node program for AT-command LoRa/LoRaWAN node modules.
//!
//! Configures the module from a TOML file, then either sends a numbered
//! message to a peer at a fixed interval or polls for frames addressed to
//! this node.

use anyhow::{Context, Result};
use tokio::task::block_in_place;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use lora_node::config::{Config, Role, TelemetryConfig};
use lora_node::driver::Driver;
use lora_node::telemetry::{Direction, FrameLogger};
use lora_node::transport::serial::SerialTransport;
use lora_node::transport::Transport;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the daily rolling application log
const APP_LOG_FILE: &str = "lora-node.log";

/// Main entry point for the LoRa node application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument or `config/default.toml`)
///    - Set up logging (stdout, plus a daily rolling file when telemetry is on)
///    - Open the serial port and reset the module
///
/// 2. **Configuration**
///    - Apply the `[lora]` settings in order and start the module
///
/// 3. **Main Loop**
///    - `send` role: send `"<message> (<n>)"` to the peer every interval
///    - `receive` role: poll for frames addressed to this node
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if the configuration is invalid, the port cannot be opened
/// or the module rejects its configuration.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_tracing(&config.telemetry);

    info!("LoRa Node v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Node {} ({:?}), peer {}",
        config.node.node_id, config.node.role, config.node.peer_id
    );

    let transport = SerialTransport::open(
        &config.serial.port,
        config.serial.baud_rate,
        Duration::from_millis(config.serial.timeout_ms),
    )
    .with_context(|| format!("Failed to open serial port {}", config.serial.port))?;

    let mut driver = Driver::with_dialect(transport, config.node.node_id, config.protocol.clone())?;

    let mut frame_log = if config.telemetry.enabled {
        Some(FrameLogger::new(&config.telemetry)?)
    } else {
        None
    };

    configure(&mut driver, &config).await?;
    block_in_place(|| driver.start_device(config.lora.mode))
        .context("Failed to start the node module")?;

    let period_ms = match config.node.role {
        Role::Send => config.node.send_interval_ms,
        Role::Receive => config.node.receive_interval_ms,
    };
    let mut ticker = interval(Duration::from_millis(period_ms));

    info!("Running as {:?} node every {} ms", config.node.role, period_ms);
    info!("Press Ctrl+C to exit");

    let mut frame_count: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = match config.node.role {
                    Role::Send => send_next(&mut driver, &config, frame_count),
                    Role::Receive => poll_received(&mut driver),
                };

                match result {
                    Ok(Some((direction, frame))) => {
                        frame_count += 1;
                        if let Some(log) = frame_log.as_mut() {
                            if let Err(e) = log.log_frame(direction, &frame) {
                                warn!("Failed to write frame log: {}", e);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total frames handled: {}", frame_count);
                break;
            }
        }
    }

    block_in_place(|| driver.close())?;
    Ok(())
}

/// Reset the module and apply the configured radio settings
async fn configure<T: Transport>(driver: &mut Driver<T>, config: &Config) -> Result<()> {
    debug!("Configuring node module...");

    if !block_in_place(|| driver.test_device()) {
        warn!("Node module did not answer the probe, continuing with reset");
    }

    block_in_place(|| driver.reset_device())?;
    sleep(Duration::from_millis(config.node.reset_settle_ms)).await;

    if config.node.role == Role::Receive {
        block_in_place(|| driver.enable_receive_mode())?;
    }

    for setting in config.lora.settings() {
        let field = setting.field();
        block_in_place(|| driver.apply_setting(setting))
            .with_context(|| format!("Failed to set {}", field))?;
    }

    if config.node.verbose {
        block_in_place(|| print_configuration(driver))?;
    }

    Ok(())
}

/// Read the configuration back from the module
fn print_configuration<T: Transport>(driver: &mut Driver<T>) -> lora_node::error::Result<()> {
    println!("\n=== LoRa Device Configuration ===");
    println!("{:18} {}", "Device ID:", driver.node_id());
    println!("{:18} {}", "Region:", driver.get_region()?);
    println!("{:18} {}", "LoRa mode:", driver.get_lora_mode()?);
    println!("{:18} {}", "Frequency:", driver.get_frequency()?);
    println!("{:18} {}", "Transmit power:", driver.get_transmit_power()?);
    println!("{:18} {}", "Bandwidth:", driver.get_bandwidth()?);
    println!("{:18} {}", "Spreading factor:", driver.get_spreading_factor()?);
    println!("{}\n", "=".repeat(33));
    Ok(())
}

type Handled = Option<(Direction, lora_node::frame::Frame)>;

fn send_next<T: Transport>(
    driver: &mut Driver<T>,
    config: &Config,
    n: u64,
) -> lora_node::error::Result<Handled> {
    let message = format!("{} ({})", config.node.message, n);
    let frame = block_in_place(|| driver.send_data(config.node.peer_id, message.as_bytes()))?;
    info!("Sent message to node {}: {}", frame.target, message);
    Ok(Some((Direction::Sent, frame)))
}

fn poll_received<T: Transport>(driver: &mut Driver<T>) -> lora_node::error::Result<Handled> {
    let node_id = driver.node_id();
    match block_in_place(|| driver.receive_data())? {
        Some(frame) if frame.target == node_id => {
            info!(
                "Received message from node {}: {}",
                frame.source,
                frame.payload_text()
            );
            Ok(Some((Direction::Received, frame)))
        }
        Some(frame) => {
            debug!("Ignoring frame for node {}", frame.target);
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Set up stdout logging, plus a daily rolling file in the telemetry
/// directory when telemetry is enabled
///
/// The returned guard must be held until exit so buffered lines are flushed.
fn init_tracing(telemetry: &TelemetryConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let stdout_layer = tracing_subscriber::fmt::layer();

    if telemetry.enabled {
        let appender = tracing_appender::rolling::daily(&telemetry.log_dir, APP_LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .init();
        None
    }
}
