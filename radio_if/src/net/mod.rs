//! # Network Module
//!
//! This module provides the transport abstraction over ZMQ, the networking
//! library chosen for the software.
//!
//! The robot does not speak to its radio hardware directly. A bridge process
//! owns the radio and forwards traffic over a ZMQ PAIR socket, one datagram
//! per message. Inbound datagrams are multipart: a 6 byte hardware address,
//! the raw payload, and optionally a 4 byte little-endian RSSI value in dBm.
//! Outbound datagrams are a single payload frame, with addressing left to
//! the bridge.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use log::info;
use serde::Deserialize;
use zmq::{Context, Socket};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| NetError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A six byte radio hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mac(pub [u8; 6]);

/// A single payload received from the radio link.
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    /// Hardware address of the sender
    pub source: Mac,

    /// Raw payload bytes
    pub payload: Vec<u8>,

    /// Receive signal strength in dBm, if the transport reports it
    pub rssi: Option<i32>,
}

/// Network parameters, loaded from `net.toml`.
#[derive(Deserialize)]
pub struct NetParams {
    /// Endpoint of the radio bridge socket
    pub link_endpoint: String,

    /// If true bind the endpoint (robot side), otherwise connect to it
    pub link_bind: bool,

    /// Hardware address of the controlling master, used for logging only as
    /// the bridge owns addressing
    pub master_mac: String,
}

/// Options which can be set on a link socket.
///
/// These correspond to those found in the
/// [`zmq_setsockopt`](http://api.zeromq.org/2-1:zmq-setsockopt) documentation.
pub struct SocketOptions {
    /// Indicates if the socket should bind itself to the endpoint. The robot
    /// side should have this value set as `true`, the bridge side `false`.
    pub bind: bool,

    /// `ZMQ_LINGER`: Set linger period for socket shutdown
    pub linger: i32,

    /// `ZMQ_RECONNECT_IVL`: Set reconnection interval
    pub reconnect_ivl: i32,

    /// `ZMQ_RECONNECT_IVL_MAX`: Set maximum reconnection interval
    pub reconnect_ivl_max: i32,

    /// `ZMQ_RCVTIMEO`: Maximum time before a recv operation returns with `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`: Maximum time before a send operation returns with `EAGAIN`
    pub send_timeout: i32,
}

/// A [`RadioLink`] over a ZMQ PAIR socket connected to the radio bridge.
pub struct ZmqLink {
    socket: Socket,
}

/// A [`RadioLink`] which drops all sends and never receives.
///
/// Used when running from a script with no radio hardware attached.
pub struct NullLink;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Could not connect the socket: {0}")]
    CouldNotConnect(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error),

    #[error("Error sending on the socket: {0}")]
    SendError(zmq::Error),

    #[error("Error receiving from the socket: {0}")]
    RecvError(zmq::Error),

    #[error("Expected 2 or 3 frames in a datagram, found {0}")]
    MalformedDatagram(usize),

    #[error("Expected a 6 byte hardware address, found {0} bytes")]
    BadAddress(usize),

    #[error("Expected a 4 byte RSSI frame, found {0} bytes")]
    BadRssi(usize),

    #[error("Invalid hardware address: {0}")]
    BadMac(#[from] MacParseError),
}

#[derive(thiserror::Error, Debug)]
pub enum MacParseError {
    #[error("Expected 6 colon-separated octets, found {0}")]
    WrongOctetCount(usize),

    #[error("Invalid octet in address: {0}")]
    InvalidOctet(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait providing a unified API over radio link transports.
pub trait RadioLink {
    /// Send a payload to the link's peer.
    fn send(&mut self, payload: &[u8]) -> Result<(), NetError>;

    /// Receive the next datagram, waiting at most `timeout_ms` for one to
    /// arrive. Returns `None` if nothing arrived in time.
    fn recv(&mut self, timeout_ms: u64) -> Result<Option<Datagram>, NetError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();

        if parts.len() != 6 {
            return Err(MacParseError::WrongOctetCount(parts.len()));
        }

        let mut bytes = [0u8; 6];

        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::InvalidOctet(part.to_string()))?;
        }

        Ok(Mac(bytes))
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn set(&self, socket: &Socket) -> Result<(), NetError> {
        // Set all the socket options, we use a macro here to make the error handling nice and
        // easy
        set_sockopts!(
            socket,
            (set_linger, self.linger),
            (set_reconnect_ivl, self.reconnect_ivl),
            (set_reconnect_ivl_max, self.reconnect_ivl_max),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout)
        );

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // Defaults for sockopts taken from http://api.zeromq.org/4-2:zmq-setsockopt
        Self {
            bind: false,
            linger: 30_000,
            reconnect_ivl: 100,
            reconnect_ivl_max: 0,
            recv_timeout: -1,
            send_timeout: 0,
        }
    }
}

impl ZmqLink {
    /// Open the link to the radio bridge described by the given parameters.
    pub fn new(ctx: &Context, params: &NetParams) -> Result<Self, NetError> {
        let socket_options = SocketOptions {
            bind: params.link_bind,
            linger: 1,
            send_timeout: 100,
            ..Default::default()
        };

        let socket = ctx
            .socket(zmq::PAIR)
            .map_err(NetError::CreateSocketError)?;

        socket_options.set(&socket)?;

        match socket_options.bind {
            true => socket.bind(&params.link_endpoint),
            false => socket.connect(&params.link_endpoint),
        }
        .map_err(NetError::CouldNotConnect)?;

        let master = Mac::from_str(&params.master_mac)?;

        info!(
            "Radio link open on {} (master {})",
            params.link_endpoint, master
        );

        Ok(Self { socket })
    }

    /// Split a multipart message from the bridge into a [`Datagram`].
    fn parse_frames(frames: Vec<Vec<u8>>) -> Result<Datagram, NetError> {
        if frames.len() < 2 || frames.len() > 3 {
            return Err(NetError::MalformedDatagram(frames.len()));
        }

        let mut frames = frames.into_iter();

        let mac_frame = frames.next().unwrap();
        let mac: [u8; 6] = mac_frame
            .as_slice()
            .try_into()
            .map_err(|_| NetError::BadAddress(mac_frame.len()))?;

        let payload = frames.next().unwrap();

        let rssi = match frames.next() {
            Some(ref f) if f.len() == 4 => Some(LittleEndian::read_i32(f)),
            Some(f) => return Err(NetError::BadRssi(f.len())),
            None => None,
        };

        Ok(Datagram {
            source: Mac(mac),
            payload,
            rssi,
        })
    }
}

impl RadioLink for ZmqLink {
    fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        self.socket.send(payload, 0).map_err(NetError::SendError)
    }

    fn recv(&mut self, timeout_ms: u64) -> Result<Option<Datagram>, NetError> {
        let num_events = self
            .socket
            .poll(zmq::POLLIN, timeout_ms as i64)
            .map_err(NetError::RecvError)?;

        if num_events == 0 {
            return Ok(None);
        }

        let frames = self
            .socket
            .recv_multipart(0)
            .map_err(NetError::RecvError)?;

        Self::parse_frames(frames).map(Some)
    }
}

impl RadioLink for NullLink {
    fn send(&mut self, _payload: &[u8]) -> Result<(), NetError> {
        Ok(())
    }

    fn recv(&mut self, _timeout_ms: u64) -> Result<Option<Datagram>, NetError> {
        Ok(None)
    }
}

impl RadioLink for Box<dyn RadioLink> {
    fn send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        (**self).send(payload)
    }

    fn recv(&mut self, timeout_ms: u64) -> Result<Option<Datagram>, NetError> {
        (**self).recv(timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mac_roundtrip() {
        let mac = Mac::from_str("A4:CF:12:9B:00:FE").unwrap();
        assert_eq!(mac.0, [0xA4, 0xCF, 0x12, 0x9B, 0x00, 0xFE]);
        assert_eq!(format!("{}", mac), "A4:CF:12:9B:00:FE");

        // Lowercase input allowed
        assert_eq!(Mac::from_str("a4:cf:12:9b:00:fe").unwrap(), mac);

        assert!(matches!(
            Mac::from_str("A4:CF:12"),
            Err(MacParseError::WrongOctetCount(3))
        ));
        assert!(matches!(
            Mac::from_str("A4:CF:12:9B:00:ZZ"),
            Err(MacParseError::InvalidOctet(_))
        ));
    }

    #[test]
    fn test_parse_frames() {
        let mac = vec![0xA4, 0xCF, 0x12, 0x9B, 0x00, 0xFE];

        // Two frame datagram has no RSSI
        let dgram = ZmqLink::parse_frames(vec![mac.clone(), b"STAND".to_vec()]).unwrap();
        assert_eq!(dgram.payload, b"STAND");
        assert_eq!(dgram.rssi, None);

        // Three frame datagram carries a little-endian RSSI
        let rssi = (-62i32).to_le_bytes().to_vec();
        let dgram =
            ZmqLink::parse_frames(vec![mac.clone(), b"UP".to_vec(), rssi]).unwrap();
        assert_eq!(dgram.rssi, Some(-62));

        assert!(matches!(
            ZmqLink::parse_frames(vec![mac.clone()]),
            Err(NetError::MalformedDatagram(1))
        ));
        assert!(matches!(
            ZmqLink::parse_frames(vec![vec![0u8; 3], b"UP".to_vec()]),
            Err(NetError::BadAddress(3))
        ));
        assert!(matches!(
            ZmqLink::parse_frames(vec![mac, b"UP".to_vec(), vec![0u8; 2]]),
            Err(NetError::BadRssi(2))
        ));
    }
}
