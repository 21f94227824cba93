//! # Command module
//!
//! This module provides the command vocabulary of the quadruped, together
//! with parsers for the two wire forms a master can use: single-token
//! strings like `UP` or `MOONWALK`, and JSON objects in either the joystick
//! shape (`{"cmd": "MOVE", ...}`) or the long shape
//! (`{"type": "command", "command": ..., "params": {...}}`).
//!
//! Parameters not given on the wire take the defaults baked in here, so a
//! bare `FORWARD` token and `{"type": "command", "command": "forward"}`
//! produce identical commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

/// Single-token commands accepted on the wire.
///
/// Tokens outside this list are reported to the master as unknown rather
/// than acknowledged.
pub static SIMPLE_COMMANDS: [&str; 15] = [
    "UP", "DOWN", "LEFT", "RIGHT", "STOP",
    "HELLO", "SCAN", "MOONWALK", "TEST",
    "FORWARD", "BACKWARD", "HOME", "STAND",
    "SPM",
    "TROT",
];

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default movement speed in percent, applied when the master gives none.
pub const DEFAULT_SPEED: f64 = 75.0;

/// Default number of gait cycles for forward/backward walks.
pub const DEFAULT_WALK_STEPS: f64 = 4.0;

/// Default number of gait cycles for turns.
pub const DEFAULT_TURN_STEPS: f64 = 3.0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command for the quadruped, with all parameters resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Forward { speed: f64, steps: f64 },
    Backward { speed: f64, steps: f64 },
    TurnLeft { speed: f64, steps: f64 },
    TurnRight { speed: f64, steps: f64 },
    Home,
    Stand,
    Hello,
    Moonwalk { steps: f64 },
    Scan,
    Trot { steps: f64, period_ms: f64, reverse: bool },
    Dance { steps: f64, period_ms: f64 },
    UpDown { steps: f64, period_ms: f64 },
    PushUp { steps: f64, period_ms: f64 },
    FrontBack { steps: f64, period_ms: f64 },
    SignalSearch,
    BalancedStand { duration_ms: u64 },
    EnableBalance,
    DisableBalance,
    GetBalance,
    GetDistance,
    GetTemperature,
    GetStatus,

    /// A command name which is not recognised. Carried through to the
    /// dispatcher so the master gets an unknown-command response rather
    /// than silence.
    Unknown(String),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum CmdParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command JSON has an unrecognised shape: {0}")]
    UnrecognisedShape(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Command {
    /// Parse a command from a JSON packet.
    pub fn from_json(json_str: &str) -> Result<Self, CmdParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(CmdParseError::InvalidJson(e))
        };

        if val["cmd"].as_str() == Some("MOVE") {
            return Ok(Self::from_move(&val))
        }

        if val["type"].as_str() == Some("command") {
            return match val["command"].as_str() {
                Some(name) => Ok(Self::from_name(name, &val["params"])),
                None => Err(CmdParseError::UnrecognisedShape(String::from(
                    "expected \"command\" to be a string"
                )))
            }
        }

        Err(CmdParseError::UnrecognisedShape(String::from(
            "expected a \"cmd\": \"MOVE\" or \"type\": \"command\" object"
        )))
    }

    /// Build a command from the joystick `MOVE` shape.
    ///
    /// Unknown directions stand the robot up rather than being rejected,
    /// since an unexpected joystick value mid-walk should halt motion.
    pub fn from_move(val: &Value) -> Self {
        let speed = val["speed"].as_f64().unwrap_or(DEFAULT_SPEED);

        match val["dir"].as_str().unwrap_or("STOP") {
            "UP" => Command::Forward { speed, steps: DEFAULT_WALK_STEPS },
            "DOWN" => Command::Backward { speed, steps: DEFAULT_WALK_STEPS },
            "LEFT" => Command::TurnLeft { speed, steps: DEFAULT_TURN_STEPS },
            "RIGHT" => Command::TurnRight { speed, steps: DEFAULT_TURN_STEPS },
            _ => Command::Stand,
        }
    }

    /// Build a command from its canonical name and a params object.
    ///
    /// `params` may be any JSON value, missing keys fall back to defaults.
    pub fn from_name(name: &str, params: &Value) -> Self {
        let speed = params["speed"].as_f64().unwrap_or(DEFAULT_SPEED);
        let steps = |default: f64| params["steps"].as_f64().unwrap_or(default);
        let period = |default: f64| params["t"].as_f64().unwrap_or(default);

        match name {
            "forward" => Command::Forward { speed, steps: steps(DEFAULT_WALK_STEPS) },
            "backward" => Command::Backward { speed, steps: steps(DEFAULT_WALK_STEPS) },
            "turn_left" => Command::TurnLeft { speed, steps: steps(DEFAULT_TURN_STEPS) },
            "turn_right" => Command::TurnRight { speed, steps: steps(DEFAULT_TURN_STEPS) },
            "home" => Command::Home,
            "stand" => Command::Stand,
            "hello" => Command::Hello,
            "moonwalk" => Command::Moonwalk { steps: steps(4.0) },
            "scan" => Command::Scan,
            "trot_walk" => Command::Trot {
                steps: steps(4.0),
                period_ms: period(800.0),
                reverse: params["direction"].as_i64().unwrap_or(1) < 0,
            },
            "dance" => Command::Dance { steps: steps(3.0), period_ms: period(2000.0) },
            "up_down" => Command::UpDown { steps: steps(2.0), period_ms: period(2000.0) },
            "push_up" => Command::PushUp { steps: steps(2.0), period_ms: period(2000.0) },
            "front_back" => Command::FrontBack { steps: steps(2.0), period_ms: period(1000.0) },
            "spm_far_from_home" => Command::SignalSearch,
            "balanced_stand" => Command::BalancedStand {
                duration_ms: params["duration"].as_u64().unwrap_or(5000),
            },
            "enable_balance" => Command::EnableBalance,
            "disable_balance" => Command::DisableBalance,
            "get_balance" => Command::GetBalance,
            "get_distance" => Command::GetDistance,
            "get_temperature" => Command::GetTemperature,
            "get_status" => Command::GetStatus,
            _ => Command::Unknown(name.to_string()),
        }
    }

    /// Map a single-token wire command to a [`Command`].
    ///
    /// The token must already be trimmed and uppercased. Tokens not in
    /// [`SIMPLE_COMMANDS`] return `None`.
    pub fn from_simple_token(token: &str) -> Option<Self> {
        let cmd = match token {
            "UP" | "FORWARD" => Command::Forward {
                speed: DEFAULT_SPEED,
                steps: DEFAULT_WALK_STEPS,
            },
            "DOWN" | "BACKWARD" => Command::Backward {
                speed: DEFAULT_SPEED,
                steps: DEFAULT_WALK_STEPS,
            },
            "LEFT" => Command::TurnLeft {
                speed: DEFAULT_SPEED,
                steps: DEFAULT_TURN_STEPS,
            },
            "RIGHT" => Command::TurnRight {
                speed: DEFAULT_SPEED,
                steps: DEFAULT_TURN_STEPS,
            },
            "STOP" | "STAND" => Command::Stand,
            "HELLO" => Command::Hello,
            "SCAN" => Command::Scan,
            "MOONWALK" => Command::Moonwalk { steps: 4.0 },
            "TEST" => Command::Unknown(String::from("test")),
            "HOME" => Command::Home,
            "SPM" => Command::SignalSearch,
            "TROT" => Command::Trot {
                steps: 4.0,
                period_ms: 800.0,
                reverse: false,
            },
            _ => return None,
        };

        Some(cmd)
    }

    /// The canonical name of this command, as used in responses and logs.
    pub fn name(&self) -> &str {
        match self {
            Command::Forward { .. } => "forward",
            Command::Backward { .. } => "backward",
            Command::TurnLeft { .. } => "turn_left",
            Command::TurnRight { .. } => "turn_right",
            Command::Home => "home",
            Command::Stand => "stand",
            Command::Hello => "hello",
            Command::Moonwalk { .. } => "moonwalk",
            Command::Scan => "scan",
            Command::Trot { .. } => "trot_walk",
            Command::Dance { .. } => "dance",
            Command::UpDown { .. } => "up_down",
            Command::PushUp { .. } => "push_up",
            Command::FrontBack { .. } => "front_back",
            Command::SignalSearch => "spm_far_from_home",
            Command::BalancedStand { .. } => "balanced_stand",
            Command::EnableBalance => "enable_balance",
            Command::DisableBalance => "disable_balance",
            Command::GetBalance => "get_balance",
            Command::GetDistance => "get_distance",
            Command::GetTemperature => "get_temperature",
            Command::GetStatus => "get_status",
            Command::Unknown(name) => name,
        }
    }

    /// True for the directional gaits which are subject to the
    /// single-movement-at-a-time gate.
    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            Command::Forward { .. }
                | Command::Backward { .. }
                | Command::TurnLeft { .. }
                | Command::TurnRight { .. }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            Command::from_simple_token("UP"),
            Some(Command::Forward { speed: 75.0, steps: 4.0 })
        );
        assert_eq!(
            Command::from_simple_token("LEFT"),
            Some(Command::TurnLeft { speed: 75.0, steps: 3.0 })
        );
        assert_eq!(Command::from_simple_token("STOP"), Some(Command::Stand));
        assert_eq!(
            Command::from_simple_token("SPM"),
            Some(Command::SignalSearch)
        );
        assert_eq!(
            Command::from_simple_token("TEST"),
            Some(Command::Unknown(String::from("test")))
        );
        assert_eq!(Command::from_simple_token("WIBBLE"), None);

        // Every token in the wire list must map to something
        for token in SIMPLE_COMMANDS.iter() {
            assert!(Command::from_simple_token(token).is_some());
        }
    }

    #[test]
    fn test_move_shape() {
        let cmd = Command::from_json(
            r#"{"cmd": "MOVE", "dir": "LEFT", "speed": 50}"#
        ).unwrap();
        assert_eq!(cmd, Command::TurnLeft { speed: 50.0, steps: 3.0 });

        // Missing speed takes the default
        let cmd = Command::from_json(
            r#"{"cmd": "MOVE", "dir": "UP"}"#
        ).unwrap();
        assert_eq!(cmd, Command::Forward { speed: 75.0, steps: 4.0 });

        // Unknown directions stand the robot up
        let cmd = Command::from_json(
            r#"{"cmd": "MOVE", "dir": "DIAGONAL"}"#
        ).unwrap();
        assert_eq!(cmd, Command::Stand);
    }

    #[test]
    fn test_command_shape() {
        let cmd = Command::from_json(
            r#"{"type": "command", "command": "forward",
                "params": {"speed": 60, "steps": 2}}"#
        ).unwrap();
        assert_eq!(cmd, Command::Forward { speed: 60.0, steps: 2.0 });

        let cmd = Command::from_json(
            r#"{"type": "command", "command": "trot_walk",
                "params": {"direction": -1}}"#
        ).unwrap();
        assert_eq!(
            cmd,
            Command::Trot { steps: 4.0, period_ms: 800.0, reverse: true }
        );

        // No params at all gives all defaults
        let cmd = Command::from_json(
            r#"{"type": "command", "command": "balanced_stand"}"#
        ).unwrap();
        assert_eq!(cmd, Command::BalancedStand { duration_ms: 5000 });

        // Unrecognised names survive as Unknown
        let cmd = Command::from_json(
            r#"{"type": "command", "command": "somersault"}"#
        ).unwrap();
        assert_eq!(cmd, Command::Unknown(String::from("somersault")));
        assert_eq!(cmd.name(), "somersault");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Command::from_json("{not json"),
            Err(CmdParseError::InvalidJson(_))
        ));
        assert!(matches!(
            Command::from_json(r#"{"type": "telemetry"}"#),
            Err(CmdParseError::UnrecognisedShape(_))
        ));
    }

    #[test]
    fn test_is_movement() {
        assert!(Command::Forward { speed: 75.0, steps: 4.0 }.is_movement());
        assert!(Command::TurnRight { speed: 75.0, steps: 3.0 }.is_movement());
        assert!(!Command::Stand.is_movement());
        assert!(!Command::SignalSearch.is_movement());
    }
}
