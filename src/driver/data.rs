//! Addressed data exchange between nodes.

use tracing::{debug, info};

use super::Driver;
use crate::at::decoder::decode_received;
use crate::at::encoder::send_command;
use crate::at::protocol::{Command, Opcode};
use crate::device::validator;
use crate::frame::{check_payload_size, check_target, Frame, Reception};
use crate::error::Result;
use crate::transport::Transport;

impl<T: Transport> Driver<T> {
    /// Send `payload` to node `target`
    ///
    /// # Arguments
    ///
    /// * `target` - Receiving node id, 1-255 and not the local id
    /// * `payload` - At most [`MAX_PAYLOAD_SIZE`](crate::frame::MAX_PAYLOAD_SIZE) bytes
    ///
    /// # Returns
    ///
    /// * `Result<Frame>` - The frame as sent
    ///
    /// # Errors
    ///
    /// * `AddressingError` - target is 0 or the local node
    /// * `InvalidParameter` - payload too large for one frame
    /// * `PreconditionNotMet` - mode unset, or LoRaWAN without a join type
    pub fn send_data(&mut self, target: u8, payload: &[u8]) -> Result<Frame> {
        check_target(self.state.node_id, target)?;
        check_payload_size(payload.len())?;
        validator::check_can_send(&self.state)?;

        let frame = Frame::new(self.state.node_id, target, payload);
        let frame_hex = frame.encode(self.dialect.frame_order)?;
        self.round_trip(&send_command(&frame_hex))?;

        info!("Sent {} bytes to node {}", frame.payload.len(), target);
        Ok(frame)
    }

    /// Poll the module for a received frame
    ///
    /// # Returns
    ///
    /// * `Ok(Some(frame))` - a frame was pending
    /// * `Ok(None)` - nothing pending
    pub fn receive_data(&mut self) -> Result<Option<Frame>> {
        let command = Command::Query(Opcode::Recv);
        let raw = self.exchange(&command)?;

        let Some(frame_hex) =
            decode_received(&raw, &self.dialect).map_err(|e| super::log_failure(&command, e))?
        else {
            return Ok(None);
        };

        let frame = Frame::decode(&frame_hex, self.dialect.frame_order)?;
        debug!(
            "Received {} bytes from node {} for node {}",
            frame.payload.len(),
            frame.source,
            frame.target
        );
        Ok(Some(frame))
    }

    /// Poll for a frame addressed to `target`
    ///
    /// A frame for any other target is consumed and reported as
    /// [`Reception::NoMatch`], which is distinct from nothing pending.
    pub fn receive_specific_data(&mut self, target: u8) -> Result<Reception> {
        match self.receive_data()? {
            None => Ok(Reception::NoData),
            Some(frame) if frame.target == target => Ok(Reception::Payload(frame.payload)),
            Some(frame) => {
                debug!(
                    "Ignoring frame for node {} while waiting for node {}",
                    frame.target, target
                );
                Ok(Reception::NoMatch(frame))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::protocol::{Dialect, FrameOrder, ResponseCode};
    use crate::device::{JoinType, Mode, Region};
    use crate::error::DriverError;
    use crate::frame::MAX_PAYLOAD_SIZE;
    use crate::transport::mocks::ScriptedTransport;

    /// LoRa-mode driver for `node_id` with the given follow-up script
    fn lora_node(node_id: u8, script: impl FnOnce(&mut ScriptedTransport)) -> Driver<ScriptedTransport> {
        let mut transport = ScriptedTransport::new();
        transport
            .expect("AT+REGION=EU868\r\n", "OK\r\n")
            .expect("AT+LORAMODE=LORA\r\n", "OK\r\n");
        script(&mut transport);

        let mut driver = Driver::new(transport, node_id).unwrap();
        driver.set_region(Region::EU868).unwrap();
        driver.set_lora_mode(Mode::LoRa).unwrap();
        driver
    }

    #[test]
    fn test_hello_between_two_nodes() {
        let mut sender = lora_node(1, |t| {
            t.expect("AT+SEND=020148656C6C6F\r\n", "+SEND=OK\r\n");
        });
        let frame = sender.send_data(2, b"Hello").unwrap();
        assert_eq!(frame.encode(FrameOrder::TargetFirst).unwrap(), "020148656C6C6F");

        let mut receiver = lora_node(2, |t| {
            t.expect("AT+RECV?\r\n", "+RECV=-37,9\t020148656C6C6F\r\n");
        });
        assert_eq!(
            receiver.receive_specific_data(2).unwrap(),
            Reception::Payload(b"Hello".to_vec())
        );
    }

    #[test]
    fn test_send_to_self_is_addressing_error() {
        let mut driver = lora_node(3, |_| {});
        assert!(matches!(
            driver.send_data(3, b"x"),
            Err(DriverError::AddressingError(_))
        ));
        assert!(matches!(
            driver.send_data(0, b"x"),
            Err(DriverError::AddressingError(_))
        ));
        assert_eq!(driver.transport.remaining(), 0);
    }

    #[test]
    fn test_send_checks_payload_and_mode() {
        let mut driver = Driver::new(ScriptedTransport::new(), 1).unwrap();
        assert!(matches!(
            driver.send_data(2, &[0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(DriverError::InvalidParameter(_))
        ));
        assert!(matches!(
            driver.send_data(2, b"x"),
            Err(DriverError::PreconditionNotMet(_))
        ));
    }

    #[test]
    fn test_send_in_lorawan_needs_join_type() {
        let mut transport = ScriptedTransport::new();
        transport
            .expect("AT+LORAMODE=LORAWAN\r\n", "OK\r\n")
            .expect("AT+JOINTYPE=OTAA\r\n", "OK\r\n")
            .expect("AT+SEND=0201AB\r\n", "+SEND=QUEUE\r\n");

        let mut driver = Driver::new(transport, 1).unwrap();
        driver.set_lora_mode(Mode::LoRaWan).unwrap();
        assert!(matches!(
            driver.send_data(2, &[0xAB]),
            Err(DriverError::PreconditionNotMet(_))
        ));

        driver.set_join_type(JoinType::Otaa).unwrap();
        driver.send_data(2, &[0xAB]).unwrap();
    }

    #[test]
    fn test_send_failure_is_reported() {
        let mut driver = lora_node(1, |t| {
            t.expect("AT+SEND=0201AA\r\n", "+SEND=FAIL\r\n");
        });
        assert!(matches!(
            driver.send_data(2, &[0xAA]),
            Err(DriverError::DeviceRejected { code: ResponseCode::Unrecognized, .. })
        ));
    }

    #[test]
    fn test_receive_no_data() {
        let mut driver = lora_node(2, |t| {
            t.expect("AT+RECV?\r\n", "+RECV=OK\r\nThe list is empty!\r\n")
                .expect("AT+RECV?\r\n", "The list is empty!\r\n");
        });
        assert_eq!(driver.receive_data().unwrap(), None);
        assert_eq!(driver.receive_specific_data(2).unwrap(), Reception::NoData);
    }

    #[test]
    fn test_receive_specific_reports_no_match() {
        let mut driver = lora_node(2, |t| {
            t.expect("AT+RECV?\r\n", "+RECV=05014869\r\n");
        });
        match driver.receive_specific_data(2).unwrap() {
            Reception::NoMatch(frame) => {
                assert_eq!(frame.target, 5);
                assert_eq!(frame.source, 1);
                assert_eq!(frame.payload, b"Hi".to_vec());
            }
            other => panic!("Expected NoMatch, got: {:?}", other),
        }
    }

    #[test]
    fn test_receive_malformed_frame() {
        let mut driver = lora_node(2, |t| {
            t.expect("AT+RECV?\r\n", "+RECV=0\r\n");
        });
        assert!(matches!(
            driver.receive_data(),
            Err(DriverError::Protocol(_))
        ));
    }

    #[test]
    fn test_source_first_dialect() {
        let dialect = Dialect {
            frame_order: FrameOrder::SourceFirst,
            ..Dialect::default()
        };
        let mut transport = ScriptedTransport::new();
        transport
            .expect("AT+LORAMODE=LORA\r\n", "OK\r\n")
            .expect("AT+SEND=0102AA\r\n", "OK\r\n")
            .expect("AT+RECV?\r\n", "+RECV=0201BB\r\n");

        let mut driver = Driver::with_dialect(transport, 1, dialect).unwrap();
        driver.set_lora_mode(Mode::LoRa).unwrap();
        driver.send_data(2, &[0xAA]).unwrap();

        let frame = driver.receive_data().unwrap().unwrap();
        assert_eq!(frame.source, 2);
        assert_eq!(frame.target, 1);
        assert_eq!(frame.payload, vec![0xBB]);
    }
}
