//! # Node Module Driver
//!
//! Public operation set for one node module.
//!
//! Every operation is one blocking round trip: validate against the
//! committed [`DeviceState`], encode, exchange over the [`Transport`],
//! decode, and only then commit. A rejected or failed operation leaves the
//! state untouched.

pub mod data;

use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::at::decoder::{decode_join_status, decode_reply, decode_value};
use crate::at::encoder::{encode_command, join_command, receive_mode_command, setting_command};
use crate::at::protocol::{Command, Dialect, Opcode, Reply};
use crate::device::validator;
use crate::device::{
    DeviceClass, DeviceState, JoinState, JoinType, Mode, PacketType, Region, Setting,
};
use crate::error::{DriverError, Result};
use crate::transport::Transport;

/// Driver for an AT-command LoRa/LoRaWAN node module
///
/// Owns the transport exclusively; all operations take `&mut self`.
///
/// # Examples
///
/// ```no_run
/// use lora_node::device::{Mode, Region};
/// use lora_node::driver::Driver;
/// use lora_node::transport::serial::{SerialTransport, DEFAULT_TIMEOUT};
///
/// let transport = SerialTransport::open("/dev/ttyUSB0", 9600, DEFAULT_TIMEOUT)?;
/// let mut driver = Driver::new(transport, 1)?;
///
/// driver.set_region(Region::EU868)?;
/// driver.set_lora_mode(Mode::LoRa)?;
/// driver.set_frequency(868_100_000)?;
/// driver.start_device(Mode::LoRa)?;
/// driver.send_data(2, b"Hello")?;
/// # Ok::<(), lora_node::error::DriverError>(())
/// ```
pub struct Driver<T: Transport> {
    transport: T,
    state: DeviceState,
    dialect: Dialect,
}

impl<T: Transport> std::fmt::Debug for Driver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("state", &self.state)
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Driver<T> {
    /// Create a driver for node `node_id` speaking the default dialect
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `node_id` is 0
    pub fn new(transport: T, node_id: u8) -> Result<Self> {
        Self::with_dialect(transport, node_id, Dialect::default())
    }

    /// Create a driver with non-default wire tokens
    pub fn with_dialect(transport: T, node_id: u8, dialect: Dialect) -> Result<Self> {
        let state = DeviceState::new(node_id)?;
        Ok(Self {
            transport,
            state,
            dialect,
        })
    }

    /// Committed configuration and session state
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn node_id(&self) -> u8 {
        self.state.node_id
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Release the transport
    pub fn close(mut self) -> Result<()> {
        info!("Closing node {}", self.state.node_id);
        self.transport.close()
    }

    // ---- Setters -------------------------------------------------------

    pub fn set_lora_mode(&mut self, mode: Mode) -> Result<()> {
        self.apply_setting(Setting::Mode(mode))
    }

    pub fn set_region(&mut self, region: Region) -> Result<()> {
        self.apply_setting(Setting::Region(region))
    }

    /// Set the channel frequency in Hz; the region must be set first
    pub fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.apply_setting(Setting::Frequency(hz))
    }

    /// Set the transmit power (EIRP) in dBm, in steps of 2 dBm
    pub fn set_transmit_power(&mut self, dbm: u8) -> Result<()> {
        self.apply_setting(Setting::TransmitPower(dbm))
    }

    pub fn set_bandwidth(&mut self, hz: u32) -> Result<()> {
        self.apply_setting(Setting::Bandwidth(hz))
    }

    pub fn set_spreading_factor(&mut self, sf: u8) -> Result<()> {
        self.apply_setting(Setting::SpreadingFactor(sf))
    }

    pub fn set_data_rate(&mut self, data_rate: u8) -> Result<()> {
        self.apply_setting(Setting::DataRate(data_rate))
    }

    pub fn set_dev_type(&mut self, class: DeviceClass) -> Result<()> {
        self.apply_setting(Setting::DevType(class))
    }

    /// Select a sub-band (US915 and CN470 only)
    pub fn set_sub_band(&mut self, sub_band: u8) -> Result<()> {
        self.apply_setting(Setting::SubBand(sub_band))
    }

    pub fn set_packet_type(&mut self, packet_type: PacketType) -> Result<()> {
        self.apply_setting(Setting::PacketType(packet_type))
    }

    pub fn set_join_type(&mut self, join_type: JoinType) -> Result<()> {
        self.apply_setting(Setting::JoinType(join_type))
    }

    pub fn set_app_eui(&mut self, app_eui: &str) -> Result<()> {
        self.apply_setting(Setting::AppEui(app_eui.to_string()))
    }

    pub fn set_app_key(&mut self, app_key: &str) -> Result<()> {
        self.apply_setting(Setting::AppKey(app_key.to_string()))
    }

    pub fn set_dev_addr(&mut self, dev_addr: &str) -> Result<()> {
        self.apply_setting(Setting::DevAddr(dev_addr.to_string()))
    }

    pub fn set_app_skey(&mut self, app_skey: &str) -> Result<()> {
        self.apply_setting(Setting::AppSKey(app_skey.to_string()))
    }

    pub fn set_nwk_skey(&mut self, nwk_skey: &str) -> Result<()> {
        self.apply_setting(Setting::NwkSKey(nwk_skey.to_string()))
    }

    pub fn enable_adr(&mut self, enabled: bool) -> Result<()> {
        self.apply_setting(Setting::Adr(enabled))
    }

    /// Switch the module to continuous receive
    pub fn enable_receive_mode(&mut self) -> Result<()> {
        self.round_trip(&receive_mode_command())?;
        self.state.receive_mode = true;
        info!("Receive mode enabled");
        Ok(())
    }

    // ---- Getters -------------------------------------------------------
    //
    // Getters report what the module says now; they never touch the
    // committed state.

    pub fn get_lora_mode(&mut self) -> Result<Mode> {
        self.query(Opcode::LoraMode)
    }

    pub fn get_region(&mut self) -> Result<Region> {
        self.query(Opcode::Region)
    }

    pub fn get_frequency(&mut self) -> Result<u32> {
        self.query(Opcode::Freqs)
    }

    pub fn get_transmit_power(&mut self) -> Result<u8> {
        self.query(Opcode::Eirp)
    }

    pub fn get_bandwidth(&mut self) -> Result<u32> {
        self.query(Opcode::Bw)
    }

    pub fn get_spreading_factor(&mut self) -> Result<u8> {
        self.query(Opcode::Sf)
    }

    pub fn get_data_rate(&mut self) -> Result<u8> {
        self.query(Opcode::DataRate)
    }

    pub fn get_dev_eui(&mut self) -> Result<String> {
        self.query(Opcode::DevEui)
    }

    pub fn get_net_id(&mut self) -> Result<String> {
        self.query(Opcode::NetId)
    }

    pub fn get_dev_addr(&mut self) -> Result<String> {
        self.query(Opcode::DevAddr)
    }

    // ---- Control -------------------------------------------------------

    /// Probe the module with a bare `AT`
    ///
    /// # Returns
    ///
    /// * `true` - the module answered with a well-formed reply in time
    /// * `false` - timeout, link failure or garbage
    pub fn test_device(&mut self) -> bool {
        match self.round_trip(&Command::Probe) {
            Ok(_) | Err(DriverError::DeviceRejected { .. }) => {
                info!("Node module responded to probe");
                true
            }
            Err(e) => {
                warn!("Node module did not respond to probe: {}", e);
                false
            }
        }
    }

    /// Reboot the module
    ///
    /// The module may restart before answering, so a timeout counts as
    /// success. An explicit error reply is still reported.
    pub fn reset_device(&mut self) -> Result<()> {
        match self.round_trip(&Command::Exec(Opcode::Reboot)) {
            Ok(_) => {}
            Err(DriverError::CommunicationTimeout(ms)) => {
                debug!("No acknowledgement of reboot within {} ms", ms);
            }
            Err(e) => return Err(e),
        }

        self.state.joined = false;
        self.state.join_state = JoinState::Idle;
        info!("Node module reset");
        Ok(())
    }

    /// Start the module in `mode`, joining the network in LoRaWAN mode
    ///
    /// # Errors
    ///
    /// Returns `PreconditionNotMet` if `mode` is not the committed mode, the
    /// region is unset, or (LoRaWAN) the join type or its credentials are
    /// missing
    pub fn start_device(&mut self, mode: Mode) -> Result<()> {
        validator::check_startable(&self.state, mode)?;
        self.round_trip(&join_command())?;

        if mode == Mode::LoRaWan {
            self.state.join_state = match self.state.join_type {
                Some(JoinType::Abp) => JoinState::Joined,
                _ => JoinState::Joining,
            };
            info!(
                "Node module started in {} mode, join state {:?}",
                mode, self.state.join_state
            );
        } else {
            info!("Node module started in {} mode", mode);
        }
        Ok(())
    }

    /// Ask the module whether it has joined the network
    ///
    /// Outside LoRaWAN mode this is `false` without any I/O.
    pub fn is_joined(&mut self) -> Result<bool> {
        if self.state.mode != Some(Mode::LoRaWan) {
            return Ok(false);
        }

        let reply = self.round_trip(&Command::Query(Opcode::Join))?;
        let joined = decode_join_status(reply)?;

        self.state.joined = joined;
        self.state.join_state = match (joined, self.state.join_state) {
            (true, _) => JoinState::Joined,
            (false, JoinState::Joined) => JoinState::Joining,
            (false, current) => current,
        };
        info!(
            "Device join status: {}",
            if joined { "joined" } else { "not joined" }
        );
        Ok(joined)
    }

    // ---- Round trips ---------------------------------------------------

    /// Validate, send and commit one setting
    ///
    /// Every `set_*` method goes through here; it is public so a list of
    /// settings (e.g. from configuration) can be replayed in order.
    pub fn apply_setting(&mut self, setting: Setting) -> Result<()> {
        validator::validate(&self.state, &setting)?;

        let command = setting_command(&setting);
        if let Reply::Value(echo) = self.round_trip(&command)? {
            check_echo(&command, &echo)?;
            debug!("{} acknowledged with '{}'", setting.field(), echo);
        }

        self.state.apply(setting);
        Ok(())
    }

    fn query<V: FromStr>(&mut self, opcode: Opcode) -> Result<V> {
        let reply = self.round_trip(&Command::Query(opcode))?;
        decode_value(reply, opcode)
    }

    /// Exchange `command` and classify the reply
    fn round_trip(&mut self, command: &Command) -> Result<Reply> {
        let raw = self.exchange(command)?;
        decode_reply(&raw, command, &self.dialect).map_err(|e| log_failure(command, e))
    }

    /// Exchange `command` and return the raw reply
    fn exchange(&mut self, command: &Command) -> Result<Vec<u8>> {
        let line = encode_command(command);
        debug!("[SEND] {}", String::from_utf8_lossy(&line).trim_end());

        let raw = self.transport.request(&line)?;
        debug!("[RECV] {}", String::from_utf8_lossy(&raw).trim());
        Ok(raw)
    }
}

/// An echoed value must be the value that was sent
fn check_echo(command: &Command, echo: &str) -> Result<()> {
    match command {
        Command::Set { opcode, value } if !echo.eq_ignore_ascii_case(value) => {
            let error = DriverError::Protocol(format!(
                "module echoed {}={} after setting {}",
                opcode, echo, value
            ));
            Err(log_failure(command, error))
        }
        _ => Ok(()),
    }
}

fn log_failure(command: &Command, error: DriverError) -> DriverError {
    match &error {
        DriverError::DeviceRejected { code, reason } => {
            warn!("Module rejected {:?}: {} ({})", command, code, reason);
        }
        other => warn!("Bad reply to {:?}: {}", command, other),
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::protocol::ResponseCode;
    use crate::transport::mocks::ScriptedTransport;
    use crate::transport::MockTransport;
    use mockall::Sequence;

    const APP_EUI: &str = "70B3D57ED0000001";
    const APP_KEY: &str = "2B7E151628AED2A6ABF7158809CF4F3C";
    const DEV_ADDR: &str = "1A2B3C4D";
    const SESSION_KEY: &str = "000102030405060708090A0B0C0D0E0F";

    fn expect(mock: &mut MockTransport, seq: &mut Sequence, command: &'static str, reply: &'static str) {
        mock.expect_request()
            .withf(move |cmd: &[u8]| cmd == command.as_bytes())
            .times(1)
            .in_sequence(seq)
            .returning(move |_: &[u8]| Ok(reply.as_bytes().to_vec()));
    }

    fn driver(transport: ScriptedTransport) -> Driver<ScriptedTransport> {
        Driver::new(transport, 1).unwrap()
    }

    /// Driver in LoRaWAN mode with region EU868 already committed
    fn lorawan_driver(script: &mut ScriptedTransport) -> Driver<ScriptedTransport> {
        script
            .expect("AT+REGION=EU868\r\n", "OK\r\n")
            .expect("AT+LORAMODE=LORAWAN\r\n", "OK\r\n");
        let mut driver = driver(std::mem::take(script));
        driver.set_region(Region::EU868).unwrap();
        driver.set_lora_mode(Mode::LoRaWan).unwrap();
        driver
    }

    #[test]
    fn test_new_rejects_node_zero() {
        let result = Driver::new(ScriptedTransport::new(), 0);
        assert!(matches!(result, Err(DriverError::InvalidParameter(_))));
    }

    #[test]
    fn test_set_frequency_after_region() {
        let mut mock = MockTransport::new();
        let mut seq = Sequence::new();
        expect(&mut mock, &mut seq, "AT+REGION=EU868\r\n", "OK\r\n");
        expect(&mut mock, &mut seq, "AT+FREQS=868100000\r\n", "+FREQS=OK\r\n");

        let mut driver = Driver::new(mock, 1).unwrap();
        driver.set_region(Region::EU868).unwrap();
        driver.set_frequency(868_100_000).unwrap();

        assert_eq!(driver.state().region, Some(Region::EU868));
        assert_eq!(driver.state().frequency, Some(868_100_000));
    }

    #[test]
    fn test_out_of_range_frequency_is_rejected_without_io() {
        let mut mock = MockTransport::new();
        let mut seq = Sequence::new();
        expect(&mut mock, &mut seq, "AT+REGION=EU868\r\n", "OK\r\n");

        let mut driver = Driver::new(mock, 1).unwrap();
        driver.set_region(Region::EU868).unwrap();
        let before = driver.state().clone();

        assert!(matches!(
            driver.set_frequency(915_000_000),
            Err(DriverError::InvalidParameter(_))
        ));
        assert_eq!(driver.state(), &before);
    }

    #[test]
    fn test_frequency_requires_region() {
        let mut driver = Driver::new(MockTransport::new(), 1).unwrap();
        assert!(matches!(
            driver.set_frequency(868_100_000),
            Err(DriverError::PreconditionNotMet(_))
        ));
        assert_eq!(driver.state().frequency, None);
    }

    #[test]
    fn test_frequency_accepted_only_in_its_region() {
        for region in Region::ALL {
            let limits = region.limits();
            for (hz, inside) in [
                (limits.frequency_min, true),
                (limits.frequency_max, true),
                (limits.frequency_min - 1, false),
                (limits.frequency_max + 1, false),
            ] {
                let mut script = ScriptedTransport::new();
                script.expect(&format!("AT+REGION={}\r\n", region), "OK\r\n");
                if inside {
                    script.expect(&format!("AT+FREQS={}\r\n", hz), "OK\r\n");
                }

                let mut driver = driver(script);
                driver.set_region(region).unwrap();
                let result = driver.set_frequency(hz);

                if inside {
                    assert!(result.is_ok(), "{} Hz rejected in {}", hz, region);
                    assert_eq!(driver.state().frequency, Some(hz));
                } else {
                    assert!(matches!(result, Err(DriverError::InvalidParameter(_))));
                    assert_eq!(driver.state().frequency, None);
                }
            }
        }
    }

    #[test]
    fn test_dev_addr_format() {
        let mut script = ScriptedTransport::new();
        let mut driver = lorawan_driver(&mut script);
        driver.transport.expect("AT+JOINTYPE=ABP\r\n", "OK\r\n");
        driver.transport.expect("AT+DEVADDR=1A2B3C4D\r\n", "OK\r\n");

        driver.set_join_type(JoinType::Abp).unwrap();
        driver.set_dev_addr(DEV_ADDR).unwrap();
        assert_eq!(driver.state().dev_addr.as_deref(), Some(DEV_ADDR));

        for bad in ["1A2B3C4", "1a2b3c4d", "1A2B3C4G", "1A2B3C4D0"] {
            assert!(
                matches!(driver.set_dev_addr(bad), Err(DriverError::InvalidParameter(_))),
                "accepted {:?}",
                bad
            );
        }
        assert_eq!(driver.state().dev_addr.as_deref(), Some(DEV_ADDR));
        assert_eq!(driver.transport.remaining(), 0);
    }

    #[test]
    fn test_device_rejection_leaves_state_unchanged() {
        let mut mock = MockTransport::new();
        let mut seq = Sequence::new();
        expect(&mut mock, &mut seq, "AT+SF=9\r\n", "ERROR:3\r\n");

        let mut driver = Driver::new(mock, 1).unwrap();
        match driver.set_spreading_factor(9) {
            Err(DriverError::DeviceRejected { code, reason }) => {
                assert_eq!(code, ResponseCode::HardwareBusy);
                assert_eq!(reason, "ERROR:3");
            }
            other => panic!("Expected DeviceRejected, got: {:?}", other),
        }
        assert_eq!(driver.state().spreading_factor, None);
    }

    #[test]
    fn test_timeout_leaves_state_unchanged() {
        let mut script = ScriptedTransport::new();
        script.expect_timeout("AT+BW=125000\r\n");

        let mut driver = driver(script);
        assert!(matches!(
            driver.set_bandwidth(125_000),
            Err(DriverError::CommunicationTimeout(_))
        ));
        assert_eq!(driver.state().bandwidth, None);
    }

    #[test]
    fn test_setter_accepts_matching_echo() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+REGION=EU868\r\n", "+REGION=EU868\r\n")
            .expect("AT+FREQS=868100000\r\n", "+FREQS=868100000\r\n");

        let mut driver = driver(script);
        driver.set_region(Region::EU868).unwrap();
        driver.set_frequency(868_100_000).unwrap();
        assert_eq!(driver.state().frequency, Some(868_100_000));
    }

    #[test]
    fn test_setter_rejects_mismatched_echo() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+REGION=EU868\r\n", "OK\r\n")
            .expect("AT+FREQS=868100000\r\n", "+FREQS=868300000\r\n");

        let mut driver = driver(script);
        driver.set_region(Region::EU868).unwrap();
        match driver.set_frequency(868_100_000) {
            Err(DriverError::Protocol(msg)) => assert!(msg.contains("868300000")),
            other => panic!("Expected Protocol error, got: {:?}", other),
        }
        assert_eq!(driver.state().frequency, None);
    }

    #[test]
    fn test_eu868_accepts_module_power_range() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+REGION=EU868\r\n", "OK\r\n")
            .expect("AT+EIRP=20\r\n", "OK\r\n")
            .expect("AT+EIRP=28\r\n", "OK\r\n");

        let mut driver = driver(script);
        driver.set_region(Region::EU868).unwrap();
        driver.set_transmit_power(20).unwrap();
        driver.set_transmit_power(28).unwrap();
        assert_eq!(driver.state().transmit_power, Some(28));
        assert!(matches!(
            driver.set_transmit_power(30),
            Err(DriverError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_setter_is_idempotent() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+REGION=US915\r\n", "OK\r\n")
            .expect("AT+EIRP=20\r\n", "OK\r\n")
            .expect("AT+REGION=US915\r\n", "OK\r\n")
            .expect("AT+EIRP=20\r\n", "OK\r\n");

        let mut driver = driver(script);
        driver.set_region(Region::US915).unwrap();
        driver.set_transmit_power(20).unwrap();
        let once = driver.state().clone();

        driver.set_region(Region::US915).unwrap();
        driver.set_transmit_power(20).unwrap();
        assert_eq!(driver.state(), &once);
    }

    #[test]
    fn test_region_change_clears_regional_fields() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+REGION=EU868\r\n", "OK\r\n")
            .expect("AT+FREQS=868100000\r\n", "OK\r\n")
            .expect("AT+REGION=US915\r\n", "OK\r\n");

        let mut driver = driver(script);
        driver.set_region(Region::EU868).unwrap();
        driver.set_frequency(868_100_000).unwrap();
        driver.set_region(Region::US915).unwrap();

        assert_eq!(driver.state().region, Some(Region::US915));
        assert_eq!(driver.state().frequency, None);
    }

    #[test]
    fn test_sub_band_only_in_us915_and_cn470() {
        for region in Region::ALL {
            let mut script = ScriptedTransport::new();
            script
                .expect(&format!("AT+REGION={}\r\n", region), "OK\r\n")
                .expect("AT+LORAMODE=LORAWAN\r\n", "OK\r\n");
            if region.supports_sub_band() {
                script.expect("AT+SUBBAND=2\r\n", "OK\r\n");
            }

            let mut driver = driver(script);
            driver.set_region(region).unwrap();
            driver.set_lora_mode(Mode::LoRaWan).unwrap();

            let result = driver.set_sub_band(2);
            if region.supports_sub_band() {
                assert!(result.is_ok());
                assert_eq!(driver.state().sub_band, Some(2));
            } else {
                assert!(matches!(result, Err(DriverError::PreconditionNotMet(_))));
            }
        }
    }

    #[test]
    fn test_getters_parse_values_without_committing() {
        let mut mock = MockTransport::new();
        let mut seq = Sequence::new();
        expect(&mut mock, &mut seq, "AT+REGION?\r\n", "+REGION=CN470\r\n");
        expect(&mut mock, &mut seq, "AT+FREQS?\r\n", "+FREQS=470300000\r\n");
        expect(&mut mock, &mut seq, "AT+LORAMODE?\r\n", "+LORAMODE=LORA\r\n");
        expect(&mut mock, &mut seq, "AT+EIRP?\r\n", "+EIRP=16\r\n");
        expect(&mut mock, &mut seq, "AT+DEVEUI?\r\n", "+DEVEUI=0011223344556677\r\n");
        expect(&mut mock, &mut seq, "AT+SF?\r\n", "+SF=twelve\r\n");

        let mut driver = Driver::new(mock, 1).unwrap();
        assert_eq!(driver.get_region().unwrap(), Region::CN470);
        assert_eq!(driver.get_frequency().unwrap(), 470_300_000);
        assert_eq!(driver.get_lora_mode().unwrap(), Mode::LoRa);
        assert_eq!(driver.get_transmit_power().unwrap(), 16);
        assert_eq!(driver.get_dev_eui().unwrap(), "0011223344556677");
        assert!(matches!(
            driver.get_spreading_factor(),
            Err(DriverError::Protocol(_))
        ));

        assert_eq!(driver.state().region, None);
        assert_eq!(driver.state().mode, None);
    }

    #[test]
    fn test_remaining_getters() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+BW?\r\n", "+BW=250000\r\n")
            .expect("AT+DATARATE?\r\n", "+DATARATE=3\r\n")
            .expect("AT+NETID?\r\n", "+NETID=000013\r\n")
            .expect("AT+DEVADDR?\r\n", "+DEVADDR=260B1234\r\n");

        let mut driver = driver(script);
        assert_eq!(driver.get_bandwidth().unwrap(), 250_000);
        assert_eq!(driver.get_data_rate().unwrap(), 3);
        assert_eq!(driver.get_net_id().unwrap(), "000013");
        assert_eq!(driver.get_dev_addr().unwrap(), "260B1234");
    }

    #[test]
    fn test_device_probe() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT\r\n", "OK\r\n")
            .expect_timeout("AT\r\n")
            .expect("AT\r\n", "noise\r\n");

        let mut driver = driver(script);
        assert!(driver.test_device());
        assert!(!driver.test_device());
        assert!(!driver.test_device());
    }

    #[test]
    fn test_device_probe_without_module() {
        use crate::transport::serial::mocks::MockPort;
        use crate::transport::serial::SerialTransport;
        use std::time::{Duration, Instant};

        let transport =
            SerialTransport::with_port(MockPort::new(), "mock", Duration::from_millis(40));
        let mut driver = Driver::new(transport, 1).unwrap();

        let start = Instant::now();
        assert!(!driver.test_device());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_reset_counts_timeout_as_success() {
        let mut script = ScriptedTransport::new();
        script
            .expect_timeout("AT+REBOOT\r\n")
            .expect("AT+REBOOT\r\n", "OK\r\n")
            .expect("AT+REBOOT\r\n", "ERROR:1\r\n");

        let mut driver = driver(script);
        driver.state.joined = true;
        driver.state.join_state = JoinState::Joined;

        driver.reset_device().unwrap();
        assert!(!driver.state().joined);
        assert_eq!(driver.state().join_state, JoinState::Idle);

        driver.reset_device().unwrap();
        assert!(matches!(
            driver.reset_device(),
            Err(DriverError::DeviceRejected { code: ResponseCode::UnsupportedCommand, .. })
        ));
    }

    #[test]
    fn test_start_requires_matching_mode_and_region() {
        let mut script = ScriptedTransport::new();
        script.expect("AT+LORAMODE=LORA\r\n", "OK\r\n");

        let mut driver = driver(script);
        assert!(matches!(
            driver.start_device(Mode::LoRa),
            Err(DriverError::PreconditionNotMet(_))
        ));

        driver.set_lora_mode(Mode::LoRa).unwrap();
        assert!(matches!(
            driver.start_device(Mode::LoRaWan),
            Err(DriverError::PreconditionNotMet(_))
        ));
        // Region still missing
        assert!(matches!(
            driver.start_device(Mode::LoRa),
            Err(DriverError::PreconditionNotMet(_))
        ));
    }

    #[test]
    fn test_start_lora_mode() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+REGION=EU868\r\n", "OK\r\n")
            .expect("AT+LORAMODE=LORA\r\n", "OK\r\n")
            .expect("AT+JOIN=1\r\n", "OK\r\n");

        let mut driver = driver(script);
        driver.set_region(Region::EU868).unwrap();
        driver.set_lora_mode(Mode::LoRa).unwrap();
        driver.start_device(Mode::LoRa).unwrap();

        assert_eq!(driver.state().join_state, JoinState::Idle);
        // LoRa mode never reports joined and never asks the module
        assert!(!driver.is_joined().unwrap());
        assert_eq!(driver.transport.remaining(), 0);
    }

    #[test]
    fn test_otaa_join_flow() {
        let mut script = ScriptedTransport::new();
        let mut driver = lorawan_driver(&mut script);
        driver
            .transport
            .expect("AT+JOINTYPE=OTAA\r\n", "OK\r\n")
            .expect(&format!("AT+JOINEUI={}\r\n", APP_EUI), "OK\r\n")
            .expect(&format!("AT+APPKEY={}\r\n", APP_KEY), "OK\r\n")
            .expect("AT+JOIN=1\r\n", "OK\r\n")
            .expect("AT+JOIN?\r\n", "+JOIN=0\r\n")
            .expect("AT+JOIN?\r\n", "+JOIN=1\r\n");

        driver.set_join_type(JoinType::Otaa).unwrap();
        driver.set_app_eui(APP_EUI).unwrap();
        assert!(matches!(
            driver.start_device(Mode::LoRaWan),
            Err(DriverError::PreconditionNotMet(_))
        ));

        driver.set_app_key(APP_KEY).unwrap();
        driver.start_device(Mode::LoRaWan).unwrap();
        assert_eq!(driver.state().join_state, JoinState::Joining);

        assert!(!driver.is_joined().unwrap());
        assert_eq!(driver.state().join_state, JoinState::Joining);

        assert!(driver.is_joined().unwrap());
        assert!(driver.state().joined);
        assert_eq!(driver.state().join_state, JoinState::Joined);
    }

    #[test]
    fn test_lost_join_returns_to_joining() {
        let mut script = ScriptedTransport::new();
        let mut driver = lorawan_driver(&mut script);
        driver
            .transport
            .expect("AT+JOIN?\r\n", "+JOIN=1\r\n")
            .expect("AT+JOIN?\r\n", "+JOIN=0\r\n");

        assert!(driver.is_joined().unwrap());
        assert_eq!(driver.state().join_state, JoinState::Joined);

        assert!(!driver.is_joined().unwrap());
        assert!(!driver.state().joined);
        assert_eq!(driver.state().join_state, JoinState::Joining);
    }

    #[test]
    fn test_switching_to_lora_drops_join_state() {
        let mut script = ScriptedTransport::new();
        let mut driver = lorawan_driver(&mut script);
        driver
            .transport
            .expect("AT+JOINTYPE=OTAA\r\n", "OK\r\n")
            .expect("AT+JOIN?\r\n", "+JOIN=1\r\n")
            .expect("AT+LORAMODE=LORA\r\n", "OK\r\n");

        driver.set_join_type(JoinType::Otaa).unwrap();
        assert!(driver.is_joined().unwrap());

        driver.set_lora_mode(Mode::LoRa).unwrap();
        let state = driver.state();
        assert_eq!(state.join_type, None);
        assert!(!state.joined);
        assert_eq!(state.join_state, JoinState::Idle);
    }

    #[test]
    fn test_abp_start_is_joined() {
        let mut script = ScriptedTransport::new();
        let mut driver = lorawan_driver(&mut script);
        driver
            .transport
            .expect("AT+JOINTYPE=ABP\r\n", "OK\r\n")
            .expect(&format!("AT+DEVADDR={}\r\n", DEV_ADDR), "OK\r\n")
            .expect(&format!("AT+APPSKEY={}\r\n", SESSION_KEY), "OK\r\n")
            .expect(&format!("AT+NWKSKEY={}\r\n", SESSION_KEY), "OK\r\n")
            .expect("AT+JOIN=1\r\n", "OK\r\n");

        driver.set_join_type(JoinType::Abp).unwrap();
        // OTAA credentials do not apply under ABP
        assert!(matches!(
            driver.set_app_key(APP_KEY),
            Err(DriverError::PreconditionNotMet(_))
        ));
        driver.set_dev_addr(DEV_ADDR).unwrap();
        driver.set_app_skey(SESSION_KEY).unwrap();
        driver.set_nwk_skey(SESSION_KEY).unwrap();
        driver.start_device(Mode::LoRaWan).unwrap();

        assert_eq!(driver.state().join_state, JoinState::Joined);
    }

    #[test]
    fn test_lorawan_options() {
        let mut script = ScriptedTransport::new();
        let mut driver = lorawan_driver(&mut script);
        driver
            .transport
            .expect("AT+DATARATE=5\r\n", "OK\r\n")
            .expect("AT+CLASS=CLASS_C\r\n", "OK\r\n")
            .expect("AT+UPLINKTYPE=CONFIRMED\r\n", "OK\r\n")
            .expect("AT+ADR=1\r\n", "+ADR=1\r\n");

        assert!(matches!(
            driver.set_data_rate(6),
            Err(DriverError::InvalidParameter(_))
        ));
        driver.set_data_rate(5).unwrap();
        driver.set_dev_type(DeviceClass::C).unwrap();
        driver.set_packet_type(PacketType::Confirmed).unwrap();
        driver.enable_adr(true).unwrap();

        let state = driver.state();
        assert_eq!(state.data_rate, Some(5));
        assert_eq!(state.dev_type, Some(DeviceClass::C));
        assert_eq!(state.packet_type, Some(PacketType::Confirmed));
        assert!(state.adr_enabled);
    }

    #[test]
    fn test_adr_requires_lorawan() {
        let mut driver = Driver::new(MockTransport::new(), 1).unwrap();
        assert!(matches!(
            driver.enable_adr(true),
            Err(DriverError::PreconditionNotMet(_))
        ));
    }

    #[test]
    fn test_enable_receive_mode() {
        let mut script = ScriptedTransport::new();
        script
            .expect("AT+RECV=1\r\n", "ERROR\r\n")
            .expect("AT+RECV=1\r\n", "+RECV=OK\r\n");

        let mut driver = driver(script);
        assert!(driver.enable_receive_mode().is_err());
        assert!(!driver.state().receive_mode);

        driver.enable_receive_mode().unwrap();
        assert!(driver.state().receive_mode);
    }

    #[test]
    fn test_close_releases_transport() {
        let mut mock = MockTransport::new();
        mock.expect_close().times(1).returning(|| Ok(()));

        let driver = Driver::new(mock, 7).unwrap();
        assert_eq!(driver.node_id(), 7);
        driver.close().unwrap();
    }
}
