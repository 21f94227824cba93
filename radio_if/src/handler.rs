//! # Protocol handler module
//!
//! The handler owns a [`RadioLink`] and implements the quadruped's half of
//! the master protocol: telemetry in both wire encodings, the inbound decode
//! ladder, automatic acknowledgement of simple tokens, and traffic counters.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;

// Internal
use crate::cmd::Command;
use crate::msg::{self, InboundEvent, OutboundMessage, MAX_PAYLOAD_BYTES};
use crate::net::{Datagram, NetError, RadioLink};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Traffic counters for the link.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkStats {
    /// Payloads sent successfully
    pub send_count: u32,

    /// Sends that failed, including oversize payloads
    pub send_errors: u32,

    /// Datagrams decoded, including unrecognised ones
    pub recv_count: u32,

    /// Transport or UTF-8 failures on receive
    pub recv_errors: u32,
}

/// Protocol handler for one radio link.
pub struct ProtocolHandler<L> {
    link: L,

    stats: LinkStats,

    /// Automatically acknowledge recognised simple tokens
    auto_ack: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the protocol layer.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Payload of {0} bytes exceeds the 250 byte radio limit")]
    PayloadTooLarge(usize),

    #[error("Could not serialise message: {0}")]
    SerialiseError(#[from] serde_json::Error),

    #[error("Link transport error: {0}")]
    LinkError(#[from] NetError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LinkStats {
    /// Percentage of attempted sends that made it out.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.send_count + self.send_errors;

        if attempted == 0 {
            0.0
        }
        else {
            self.send_count as f64 / attempted as f64 * 100.0
        }
    }
}

impl<L: RadioLink> ProtocolHandler<L> {
    /// Create a handler over the given link with auto-acknowledge on.
    pub fn new(link: L) -> Self {
        Self::with_auto_ack(link, true)
    }

    pub fn with_auto_ack(link: L, auto_ack: bool) -> Self {
        Self {
            link,
            stats: LinkStats::default(),
            auto_ack,
        }
    }

    /// Current traffic counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Send a raw string payload, enforcing the radio's size limit.
    ///
    /// Oversize payloads are rejected before touching the link and counted
    /// as send errors.
    pub fn send_str(&mut self, payload: &str) -> Result<(), ProtoError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            self.stats.send_errors += 1;
            return Err(ProtoError::PayloadTooLarge(payload.len()));
        }

        match self.link.send(payload.as_bytes()) {
            Ok(()) => {
                self.stats.send_count += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(e.into())
            }
        }
    }

    /// Periodic sensor telemetry.
    ///
    /// The count field carries the number of payloads sent before this one,
    /// letting the master spot gaps in the stream.
    pub fn send_sensor_data(
        &mut self,
        distance_cm: f64,
        temperature_c: f64,
        status: &str,
    ) -> Result<(), ProtoError> {
        let msg = OutboundMessage::SensorData {
            distance: distance_cm,
            temperature: temperature_c,
            status: status.to_string(),
            timestamp: now_ms(),
            count: self.stats.send_count,
        };

        self.send_message(&msg)
    }

    /// Reply to a command.
    pub fn send_response(
        &mut self,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), ProtoError> {
        let msg = OutboundMessage::Response {
            result,
            error,
            timestamp: now_ms(),
        };

        self.send_message(&msg)
    }

    /// Unprompted notification to the master.
    pub fn send_alert(&mut self, alert_type: &str, message: &str) -> Result<(), ProtoError> {
        let msg = OutboundMessage::Alert {
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            timestamp: now_ms(),
        };

        self.send_message(&msg)
    }

    /// Compact range reading for masters which don't parse JSON.
    pub fn send_range(&mut self, distance_cm: f64) -> Result<(), ProtoError> {
        self.send_str(&msg::range_str(distance_cm))
    }

    /// Compact temperature reading.
    pub fn send_temperature(&mut self, temp_c: f64) -> Result<(), ProtoError> {
        self.send_str(&msg::temperature_str(temp_c))
    }

    /// Acknowledge, optionally naming the token being acknowledged.
    pub fn send_ack(&mut self, token: Option<&str>) -> Result<(), ProtoError> {
        match token {
            Some(t) => self.send_str(&msg::ack_str(t)),
            None => self.send_str(msg::ACK),
        }
    }

    /// Receive and decode the next datagram, waiting at most `timeout_ms`.
    ///
    /// The decode ladder: JSON objects are checked for the two command
    /// shapes and otherwise passed through as [`InboundEvent::Structured`];
    /// anything else is treated as a single-token command, with recognised
    /// tokens acknowledged on the spot when auto-ack is on. Non-UTF-8
    /// payloads come back as [`InboundEvent::DecodeError`].
    pub fn receive(&mut self, timeout_ms: u64) -> Result<Option<InboundEvent>, ProtoError> {
        let dgram = match self.link.recv(timeout_ms) {
            Ok(Some(d)) => d,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.stats.recv_errors += 1;
                return Err(e.into());
            }
        };

        let Datagram {
            source,
            payload,
            rssi,
        } = dgram;

        let text = match String::from_utf8(payload) {
            Ok(t) => t,
            Err(e) => {
                self.stats.recv_errors += 1;
                warn!("Undecodable payload from {}", source);
                return Ok(Some(InboundEvent::DecodeError {
                    source,
                    raw: e.into_bytes(),
                    rssi,
                }));
            }
        };

        self.stats.recv_count += 1;

        // JSON objects first
        if let Ok(val) = serde_json::from_str::<Value>(&text) {
            if val.is_object() {
                if val["cmd"].as_str() == Some("MOVE") {
                    let cmd = Command::from_move(&val);
                    debug!("MOVE from {}: {}", source, cmd.name());
                    return Ok(Some(InboundEvent::Command { source, cmd, rssi }));
                }

                if val["type"].as_str() == Some("command") {
                    if let Some(name) = val["command"].as_str() {
                        let cmd = Command::from_name(name, &val["params"]);
                        debug!("Command from {}: {}", source, cmd.name());
                        return Ok(Some(InboundEvent::Command { source, cmd, rssi }));
                    }
                }

                return Ok(Some(InboundEvent::Structured {
                    source,
                    data: val,
                    rssi,
                }));
            }
        }

        // Then the single-token form
        let token = text.trim().to_uppercase();

        if let Some(cmd) = Command::from_simple_token(&token) {
            if self.auto_ack {
                // The master sees the ack even if the command later fails
                if let Err(e) = self.send_ack(Some(&token)) {
                    warn!("Could not acknowledge {}: {}", token, e);
                }
            }

            return Ok(Some(InboundEvent::Command { source, cmd, rssi }));
        }

        warn!("Unknown cmd from {}: {}", source, text);

        Ok(Some(InboundEvent::Unknown {
            source,
            raw: text,
            rssi,
        }))
    }

    fn send_message(&mut self, msg: &OutboundMessage) -> Result<(), ProtoError> {
        let json = match msg.to_json() {
            Ok(j) => j,
            Err(e) => {
                self.stats.send_errors += 1;
                return Err(e.into());
            }
        };

        self.send_str(&json)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Milliseconds since the unix epoch, used to timestamp outbound messages.
fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::Mac;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const SOURCE: Mac = Mac([0xA4, 0xCF, 0x12, 0x9B, 0x00, 0xFE]);

    /// Link which records sends and replays queued datagrams.
    struct MockLink {
        sent: Rc<RefCell<Vec<Vec<u8>>>>,
        inbound: VecDeque<Datagram>,
        fail_sends: bool,
        fail_recvs: bool,
    }

    impl MockLink {
        fn new() -> (Self, Rc<RefCell<Vec<Vec<u8>>>>) {
            let sent = Rc::new(RefCell::new(vec![]));
            let link = Self {
                sent: sent.clone(),
                inbound: VecDeque::new(),
                fail_sends: false,
                fail_recvs: false,
            };
            (link, sent)
        }

        fn push_inbound(&mut self, payload: &[u8], rssi: Option<i32>) {
            self.inbound.push_back(Datagram {
                source: SOURCE,
                payload: payload.to_vec(),
                rssi,
            });
        }
    }

    impl RadioLink for MockLink {
        fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
            if self.fail_sends {
                return Err(NetError::SendError(zmq::Error::EAGAIN));
            }
            self.sent.borrow_mut().push(payload.to_vec());
            Ok(())
        }

        fn recv(&mut self, _timeout_ms: u64) -> Result<Option<Datagram>, NetError> {
            if self.fail_recvs {
                return Err(NetError::RecvError(zmq::Error::EAGAIN));
            }
            Ok(self.inbound.pop_front())
        }
    }

    #[test]
    fn test_payload_size_limit() {
        let (link, sent) = MockLink::new();
        let mut handler = ProtocolHandler::new(link);

        // Exactly at the limit goes out
        let at_limit = "x".repeat(250);
        handler.send_str(&at_limit).unwrap();
        assert_eq!(handler.stats().send_count, 1);
        assert_eq!(sent.borrow().len(), 1);

        // One byte over is rejected before touching the link and counted
        let over = "x".repeat(251);
        assert!(matches!(
            handler.send_str(&over),
            Err(ProtoError::PayloadTooLarge(251))
        ));
        assert_eq!(handler.stats().send_errors, 1);
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn test_token_decode_and_ack() {
        let (mut link, sent) = MockLink::new();
        // Whitespace and case are normalised before matching
        link.push_inbound(b"  up \n", Some(-55));
        let mut handler = ProtocolHandler::new(link);

        let event = handler.receive(10).unwrap().unwrap();
        match event {
            InboundEvent::Command { source, cmd, rssi } => {
                assert_eq!(source, SOURCE);
                assert_eq!(cmd, Command::Forward { speed: 75.0, steps: 4.0 });
                assert_eq!(rssi, Some(-55));
            }
            other => panic!("expected a command event, got {:?}", other),
        }

        // The recognised token was acknowledged on the spot
        assert_eq!(sent.borrow().as_slice(), &[b"ACK:UP".to_vec()]);
        assert_eq!(handler.stats().recv_count, 1);

        // With auto-ack off the token still decodes but nothing goes out
        let (mut link, sent) = MockLink::new();
        link.push_inbound(b"UP", None);
        let mut handler = ProtocolHandler::with_auto_ack(link, false);

        assert!(matches!(
            handler.receive(10).unwrap().unwrap(),
            InboundEvent::Command { .. }
        ));
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn test_move_decode() {
        let (mut link, sent) = MockLink::new();
        link.push_inbound(br#"{"cmd": "MOVE", "dir": "LEFT", "speed": 50}"#, None);
        let mut handler = ProtocolHandler::new(link);

        let event = handler.receive(10).unwrap().unwrap();
        match event {
            InboundEvent::Command { cmd, .. } => {
                assert_eq!(cmd, Command::TurnLeft { speed: 50.0, steps: 3.0 });
            }
            other => panic!("expected a command event, got {:?}", other),
        }

        // JSON commands are not acknowledged
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn test_decode_ladder() {
        let (mut link, sent) = MockLink::new();
        link.push_inbound(br#"{"type": "telemetry_request", "fields": ["distance"]}"#, None);
        link.push_inbound(b"GIBBERISH", Some(-70));
        link.push_inbound(&[0xFF, 0xFE, 0x00], None);
        let mut handler = ProtocolHandler::new(link);

        // Valid JSON which is not a command passes through
        assert!(matches!(
            handler.receive(10).unwrap().unwrap(),
            InboundEvent::Structured { .. }
        ));

        // Unknown tokens are reported but not acknowledged
        match handler.receive(10).unwrap().unwrap() {
            InboundEvent::Unknown { raw, rssi, .. } => {
                assert_eq!(raw, "GIBBERISH");
                assert_eq!(rssi, Some(-70));
            }
            other => panic!("expected an unknown event, got {:?}", other),
        }
        assert!(sent.borrow().is_empty());

        // Non-UTF-8 payloads count as receive errors
        assert!(matches!(
            handler.receive(10).unwrap().unwrap(),
            InboundEvent::DecodeError { .. }
        ));
        assert_eq!(handler.stats().recv_count, 2);
        assert_eq!(handler.stats().recv_errors, 1);

        // Nothing queued gives None
        assert!(handler.receive(10).unwrap().is_none());
    }

    #[test]
    fn test_transport_errors_are_counted() {
        let (mut link, _sent) = MockLink::new();
        link.fail_recvs = true;
        let mut handler = ProtocolHandler::new(link);

        assert!(handler.receive(10).is_err());
        assert_eq!(handler.stats().recv_errors, 1);
    }

    #[test]
    fn test_success_rate() {
        let (mut link, _sent) = MockLink::new();
        link.fail_sends = true;
        let mut handler = ProtocolHandler::new(link);

        assert_eq!(handler.stats().success_rate(), 0.0);

        assert!(handler.send_str("STATUS").is_err());
        // 0 of 1 attempts made it
        assert_eq!(handler.stats().success_rate(), 0.0);
        assert_eq!(handler.stats().send_errors, 1);

        let (link, _sent) = MockLink::new();
        let mut handler = ProtocolHandler::new(link);
        handler.send_str("a").unwrap();
        handler.send_str("b").unwrap();
        handler.send_str("c").unwrap();
        assert!(handler.send_str(&"x".repeat(300)).is_err());
        assert_eq!(handler.stats().success_rate(), 75.0);
    }

    #[test]
    fn test_compact_telemetry() {
        let (link, sent) = MockLink::new();
        let mut handler = ProtocolHandler::new(link);

        handler.send_range(45.9).unwrap();
        handler.send_range(-1.0).unwrap();
        handler.send_temperature(23.42).unwrap();
        handler.send_ack(None).unwrap();

        assert_eq!(
            sent.borrow().as_slice(),
            &[
                b"RANGE:45cm".to_vec(),
                b"RANGE:ERROR".to_vec(),
                b"TEMP:23.4C".to_vec(),
                b"ACK".to_vec(),
            ]
        );
        assert_eq!(handler.stats().send_count, 4);
    }

    #[test]
    fn test_sensor_data_count_field() {
        let (link, sent) = MockLink::new();
        let mut handler = ProtocolHandler::new(link);

        handler.send_sensor_data(42.0, 21.5, "OK").unwrap();
        handler.send_sensor_data(-1.0, 21.5, "NO_OBJECT").unwrap();

        let sent = sent.borrow();
        let first: Value = serde_json::from_slice(&sent[0]).unwrap();
        let second: Value = serde_json::from_slice(&sent[1]).unwrap();

        assert_eq!(first["type"], "sensor_data");
        assert_eq!(first["count"], 0);
        assert_eq!(first["distance"], 42.0);
        assert_eq!(second["count"], 1);
        assert_eq!(second["status"], "NO_OBJECT");
    }
}
