//! # Wire message module
//!
//! Defines the messages the quadruped sends to its master, plus the decoded
//! form of everything it can receive.
//!
//! Outbound traffic uses two encodings side by side: JSON objects tagged
//! with a `"type"` field for structured telemetry, and compact strings
//! (`RANGE:45cm`, `TEMP:23.4C`, `ACK:STAND`) for masters too small to parse
//! JSON. Both fit well inside the radio's payload limit.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use serde_json::Value;

// Internal
use crate::cmd::Command;
use crate::net::Mac;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum payload size the radio will accept, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 250;

/// Bare acknowledgement payload.
pub const ACK: &str = "ACK";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A JSON message sent to the master.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Periodic sensor telemetry
    SensorData {
        /// Range reading in cm, -1 when the sensor saw no echo
        distance: f64,
        temperature: f64,
        status: String,
        timestamp: u64,
        /// Number of payloads sent so far, lets the master spot gaps
        count: u32,
    },

    /// Reply to a command. Both fields are always present on the wire,
    /// `null` where there is nothing to report.
    Response {
        result: Option<Value>,
        error: Option<String>,
        timestamp: u64,
    },

    /// Unprompted notification, e.g. an obstacle appearing
    Alert {
        alert_type: String,
        message: String,
        timestamp: u64,
    },
}

/// A decoded inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A command in any of the wire forms
    Command {
        source: Mac,
        cmd: Command,
        rssi: Option<i32>,
    },

    /// Valid JSON which is not a command, passed through for the caller
    Structured {
        source: Mac,
        data: Value,
        rssi: Option<i32>,
    },

    /// Valid UTF-8 which is neither JSON nor a known token
    Unknown {
        source: Mac,
        raw: String,
        rssi: Option<i32>,
    },

    /// Payload was not valid UTF-8
    DecodeError {
        source: Mac,
        raw: Vec<u8>,
        rssi: Option<i32>,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OutboundMessage {
    /// Serialise to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Compact range reading.
///
/// Readings under a metre are sent as whole centimetres (`RANGE:45cm`),
/// larger ones as metres to two places (`RANGE:1.52m`). Negative readings
/// mean the sensor saw no echo and become `RANGE:ERROR`.
pub fn range_str(distance_cm: f64) -> String {
    if distance_cm < 0.0 {
        String::from("RANGE:ERROR")
    }
    else if distance_cm < 100.0 {
        format!("RANGE:{}cm", distance_cm as u32)
    }
    else {
        format!("RANGE:{:.2}m", distance_cm / 100.0)
    }
}

/// Compact temperature reading (`TEMP:23.4C`), or `TEMP:ERROR` for values
/// outside the plausible range of [-50, 150] degrees C.
pub fn temperature_str(temp_c: f64) -> String {
    if temp_c < -50.0 || temp_c > 150.0 {
        String::from("TEMP:ERROR")
    }
    else {
        format!("TEMP:{:.1}C", temp_c)
    }
}

/// Acknowledgement for a simple command token (`ACK:STAND`).
pub fn ack_str(token: &str) -> String {
    format!("ACK:{}", token)
}
