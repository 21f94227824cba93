//! # Radio interface crate.
//!
//! Provides the command vocabulary, wire message formats and link transport
//! used to talk to the quadruped over its radio bridge.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command vocabulary and parsers for both wire forms
pub mod cmd;

/// Wire message definitions (outbound telemetry and inbound events)
pub mod msg;

/// Network module
pub mod net;

/// Stateful protocol handler sitting between the link and the executive
pub mod handler;
