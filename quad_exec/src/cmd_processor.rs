//! # Command processor module
//!
//! The command processor executes decoded master commands against the gait
//! engine and builds the response payload for each one.
//!
//! Movement commands (the four directional gaits) pass through a single-flight
//! gate: while one is running, further movement commands are logged and
//! dropped without a response. Motions which end away from the standing pose
//! are settled briefly and re-stood before the response goes out. Any error
//! during a command is caught here, the robot is returned to a stable pose,
//! and the error text is reported to the master rather than tearing the
//! process down.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, warn};
use serde_json::{json, Value};
use thiserror::Error;

// Internal
use crate::gait::{GaitEngine, GaitError, BALANCE_UPDATE_PERIOD_MS, STAND_DURATION_MS};
use crate::sensors::TempSensor;
use crate::servo_ctrl::ServoDriver;
use crate::signal_search::{self, SearchError};
use radio_if::cmd::Command;
use radio_if::handler::ProtocolHandler;
use radio_if::net::RadioLink;
use util::maths::{clamp, lin_map};
use util::time::Clock;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Accepted speed command range.
///
/// Units: percent
const SPEED_RANGE_PCT: (f64, f64) = (25.0, 100.0);

/// Gait periods at the speed range endpoints. Higher speeds map to shorter
/// periods.
///
/// Units: milliseconds
const PERIOD_RANGE_MS: (f64, f64) = (2000.0, 500.0);

/// Pause between a motion ending and the return to stand.
///
/// Units: milliseconds
const MOTION_SETTLE_MS: u64 = 200;

/// Fixed cycle period of the moonwalk.
///
/// Units: milliseconds
const MOONWALK_PERIOD_MS: f64 = 2000.0;

/// Attitude threshold for the tilted flag in balance reports.
///
/// Units: degrees
const TILT_THRESHOLD_DEG: f64 = 15.0;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Process-wide dispatch state.
///
/// Lives for the whole process and gates movement commands so that at most
/// one executes at a time.
#[derive(Debug, Default)]
pub struct ExecState {
    /// True while a movement command is executing.
    movement_busy: bool,

    /// When the most recent movement command started, on the motion clock.
    ///
    /// Units: milliseconds
    last_movement_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What the dispatcher decided to send back to the master.
#[derive(Debug, PartialEq)]
pub enum DispatchOutcome {
    /// Dropped by the movement gate, nothing is sent.
    Skipped,

    /// Response payload for the master.
    Respond {
        result: Option<Value>,
        error: Option<String>,
    },
}

/// Errors surfaced to the master as an error response.
#[derive(Debug, Error)]
enum CmdError {
    #[error(transparent)]
    Gait(#[from] GaitError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a command.
///
/// Never panics and never returns a transport error: command faults are
/// caught, the robot is stood back up, and the fault text becomes the error
/// field of the response.
pub fn exec<D: ServoDriver, C: Clock, L: RadioLink>(
    state: &mut ExecState,
    engine: &mut GaitEngine<D, C>,
    temp_sensor: &mut dyn TempSensor,
    handler: &mut ProtocolHandler<L>,
    cmd: &Command,
) -> DispatchOutcome {
    if cmd.is_movement() {
        if state.movement_busy {
            warn!("{} skipped, a movement is already in progress", cmd.name());
            return DispatchOutcome::Skipped;
        }

        state.movement_busy = true;
        state.last_movement_ms = Some(engine.now_ms());
    }

    debug!("Recieved {} command", cmd.name());

    let outcome = match run(state, engine, temp_sensor, handler, cmd) {
        Ok(result) => DispatchOutcome::Respond {
            result,
            error: None,
        },
        Err(e) => {
            error!("{} failed: {}", cmd.name(), e);

            // Recover into a stable pose before reporting
            if let Err(stand_err) = engine.stand(STAND_DURATION_MS) {
                warn!("Recovery stand failed: {}", stand_err);
            }

            DispatchOutcome::Respond {
                result: None,
                error: Some(format!("Error: {}", e)),
            }
        }
    };

    if cmd.is_movement() {
        state.movement_busy = false;
    }

    outcome
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Run a single command to completion, producing its result payload.
fn run<D: ServoDriver, C: Clock, L: RadioLink>(
    state: &ExecState,
    engine: &mut GaitEngine<D, C>,
    temp_sensor: &mut dyn TempSensor,
    handler: &mut ProtocolHandler<L>,
    cmd: &Command,
) -> Result<Option<Value>, CmdError> {
    match *cmd {
        // ---- MOVEMENT ----
        Command::Forward { speed, steps } => {
            engine.forward(steps, speed_to_period_ms(speed))?;
            engine.stand(STAND_DURATION_MS)?;
            Ok(None)
        }
        Command::Backward { speed, steps } => {
            engine.backward(steps, speed_to_period_ms(speed))?;
            engine.stand(STAND_DURATION_MS)?;
            Ok(None)
        }
        Command::TurnLeft { speed, steps } => {
            engine.turn_left(steps, speed_to_period_ms(speed))?;
            engine.stand(STAND_DURATION_MS)?;
            Ok(None)
        }
        Command::TurnRight { speed, steps } => {
            engine.turn_right(steps, speed_to_period_ms(speed))?;
            engine.stand(STAND_DURATION_MS)?;
            Ok(None)
        }

        // ---- POSES ----
        Command::Home => {
            engine.home()?;
            Ok(None)
        }
        Command::Stand => {
            engine.stand(STAND_DURATION_MS)?;
            Ok(None)
        }

        // ---- SETTLED MOTIONS ----
        Command::Hello => {
            engine.hello()?;
            settle_and_stand(engine)
        }
        Command::Moonwalk { steps } => {
            engine.moonwalk_left(steps, MOONWALK_PERIOD_MS)?;
            settle_and_stand(engine)
        }
        Command::Scan => {
            engine.scan(1)?;
            settle_and_stand(engine)
        }
        Command::Trot {
            steps,
            period_ms,
            reverse,
        } => {
            engine.trot(steps, period_ms, reverse)?;
            settle_and_stand(engine)
        }
        Command::Dance { steps, period_ms } => {
            engine.dance(steps, period_ms)?;
            settle_and_stand(engine)
        }
        Command::UpDown { steps, period_ms } => {
            engine.up_down(steps, period_ms)?;
            settle_and_stand(engine)
        }
        Command::PushUp { steps, period_ms } => {
            engine.push_up(steps, period_ms)?;
            settle_and_stand(engine)
        }
        Command::FrontBack { steps, period_ms } => {
            engine.front_back(steps, period_ms)?;
            settle_and_stand(engine)
        }

        // ---- SIGNAL SEARCH ----
        Command::SignalSearch => {
            let result = signal_search::run(engine, handler)?;
            Ok(Some(result))
        }

        // ---- BALANCE ----
        Command::BalancedStand { duration_ms } => {
            engine.balanced_stand(duration_ms, BALANCE_UPDATE_PERIOD_MS)?;
            Ok(Some(json!({ "status": "balanced_stand_complete" })))
        }
        Command::EnableBalance => {
            engine.enable_balance();
            Ok(Some(json!({ "status": "balance_enabled" })))
        }
        Command::DisableBalance => {
            engine.disable_balance();
            Ok(Some(json!({ "status": "balance_disabled" })))
        }
        Command::GetBalance => {
            if !engine.has_balance_controller() {
                return Ok(Some(json!({ "error": "no balance controller" })));
            }

            let (roll_deg, pitch_deg) = engine.balance_angles();

            Ok(Some(json!({
                "roll": (roll_deg * 100.0).round() / 100.0,
                "pitch": (pitch_deg * 100.0).round() / 100.0,
                "tilted": engine.is_tilted(TILT_THRESHOLD_DEG),
                "enabled": engine.is_balance_enabled(),
            })))
        }

        // ---- QUERIES ----
        Command::GetDistance => Ok(Some(json!({ "distance_cm": engine.distance_cm() }))),
        Command::GetTemperature => Ok(Some(json!({
            "temperature_c": temp_sensor.temperature_c()
        }))),
        Command::GetStatus => {
            let stats = handler.stats();
            let idle_ms = state
                .last_movement_ms
                .map(|start_ms| engine.now_ms().saturating_sub(start_ms));

            Ok(Some(json!({
                "distance_cm": engine.distance_cm(),
                "temperature_c": temp_sensor.temperature_c(),
                "servo_state": if engine.is_resting() { "resting" } else { "active" },
                "idle_ms": idle_ms,
                "sent": stats.send_count,
                "received": stats.recv_count,
            })))
        }

        Command::Unknown(ref name) => {
            warn!("Unknown command: {}", name);
            Ok(Some(json!({ "error": format!("Unknown: {}", name) })))
        }
    }
}

/// Return to the standing pose after a short pause, the shared tail of every
/// motion which ends away from it.
fn settle_and_stand<D: ServoDriver, C: Clock>(
    engine: &mut GaitEngine<D, C>,
) -> Result<Option<Value>, CmdError> {
    engine.settle(MOTION_SETTLE_MS);
    engine.stand(STAND_DURATION_MS)?;
    Ok(None)
}

/// Map a speed percentage onto a gait period.
fn speed_to_period_ms(speed_pct: f64) -> f64 {
    let clamped = clamp(&speed_pct, &SPEED_RANGE_PCT.0, &SPEED_RANGE_PCT.1);
    lin_map(SPEED_RANGE_PCT, PERIOD_RANGE_MS, clamped)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::gait::{BalanceController, GaitParams, NUM_SERVOS};
    use crate::sensors::{SimRange, SimTemp};
    use crate::servo_ctrl::sim::SimServoBoard;
    use radio_if::net::NullLink;
    use util::time::SimClock;

    /// Controller reporting a fixed attitude with no corrections.
    struct FixedAttitude {
        roll_deg: f64,
        pitch_deg: f64,
    }

    impl BalanceController for FixedAttitude {
        fn calibrate(&mut self) {}
        fn enable(&mut self) {}
        fn disable(&mut self) {}

        fn update(&mut self) -> [f64; NUM_SERVOS] {
            [0.0; NUM_SERVOS]
        }

        fn angles(&mut self) -> (f64, f64) {
            (self.roll_deg, self.pitch_deg)
        }
    }

    fn fixture() -> (
        ExecState,
        GaitEngine<SimServoBoard, SimClock>,
        SimTemp,
        ProtocolHandler<NullLink>,
    ) {
        let mut engine = GaitEngine::new(
            SimServoBoard::default(),
            SimClock::new(),
            &GaitParams::default(),
        );
        engine.init().unwrap();

        (
            ExecState::default(),
            engine,
            SimTemp::new(36.5),
            ProtocolHandler::new(NullLink),
        )
    }

    fn expect_result(outcome: DispatchOutcome) -> Value {
        match outcome {
            DispatchOutcome::Respond {
                result: Some(result),
                error: None,
            } => result,
            other => panic!("expected a result payload, got {:?}", other),
        }
    }

    #[test]
    fn test_speed_maps_linearly_onto_period() {
        assert!((speed_to_period_ms(25.0) - 2000.0).abs() < 1e-9);
        assert!((speed_to_period_ms(100.0) - 500.0).abs() < 1e-9);
        assert!((speed_to_period_ms(62.5) - 1250.0).abs() < 1e-9);

        // Out-of-range speeds clamp to the endpoints
        assert!((speed_to_period_ms(0.0) - 2000.0).abs() < 1e-9);
        assert!((speed_to_period_ms(200.0) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_movement_runs_and_ends_standing() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();

        let cmd = Command::Forward {
            speed: 75.0,
            steps: 0.2,
        };
        let outcome = exec(&mut state, &mut engine, &mut temp, &mut handler, &cmd);

        assert_eq!(
            outcome,
            DispatchOutcome::Respond {
                result: None,
                error: None
            }
        );
        assert!(!state.movement_busy);
        assert!(state.last_movement_ms.is_some());
        assert!(engine.is_resting());

        // Speed 75 percent is a 1000 ms gait period
        assert!((engine.oscillators[0].period_ms() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_busy_gate_skips_movement_only() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();
        state.movement_busy = true;

        let writes_before = engine.driver.write_count(0);
        let cmd = Command::Forward {
            speed: 75.0,
            steps: 2.0,
        };

        let outcome = exec(&mut state, &mut engine, &mut temp, &mut handler, &cmd);
        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert_eq!(engine.driver.write_count(0), writes_before);

        // The gate stays held by its owner
        assert!(state.movement_busy);

        // Queries pass the gate
        let outcome = exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::GetDistance,
        );
        assert!(matches!(outcome, DispatchOutcome::Respond { .. }));
    }

    #[test]
    fn test_obstacle_reports_error_and_recovers() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();
        engine.set_range_sensor(Box::new(SimRange::new(10.0)));

        let cmd = Command::Forward {
            speed: 75.0,
            steps: 2.0,
        };
        let outcome = exec(&mut state, &mut engine, &mut temp, &mut handler, &cmd);

        assert_eq!(
            outcome,
            DispatchOutcome::Respond {
                result: None,
                error: Some("Error: Obstacle detected 10.0 cm ahead".to_string())
            }
        );
        assert!(!state.movement_busy);
        assert!(engine.is_resting());
    }

    #[test]
    fn test_settled_motions_return_to_stand() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();

        for cmd in [
            Command::Hello,
            Command::Moonwalk { steps: 1.0 },
            Command::Trot {
                steps: 1.0,
                period_ms: 800.0,
                reverse: false,
            },
            Command::Dance {
                steps: 1.0,
                period_ms: 2000.0,
            },
        ]
        .iter()
        {
            let outcome = exec(&mut state, &mut engine, &mut temp, &mut handler, cmd);
            assert_eq!(
                outcome,
                DispatchOutcome::Respond {
                    result: None,
                    error: None
                },
                "command {}",
                cmd.name()
            );
            assert!(engine.is_resting(), "command {}", cmd.name());

            let stand = GaitParams::default().stand_pose_deg;
            for i in 0..NUM_SERVOS {
                let angle = engine.driver.angle_deg(i as u8).unwrap();
                assert!((angle - stand[i]).abs() < 1e-9, "servo {}", i);
            }
        }
    }

    #[test]
    fn test_balance_queries() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();

        // Without a controller the balance query is an error payload
        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::GetBalance,
        ));
        assert_eq!(result["error"], "no balance controller");

        engine.set_balance_controller(Box::new(FixedAttitude {
            roll_deg: 3.3333,
            pitch_deg: -1.0,
        }));

        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::GetBalance,
        ));
        assert_eq!(result["roll"], 3.33);
        assert_eq!(result["pitch"], -1.0);
        assert_eq!(result["tilted"], false);
        assert_eq!(result["enabled"], false);

        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::EnableBalance,
        ));
        assert_eq!(result["status"], "balance_enabled");
        assert!(engine.is_balance_enabled());

        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::BalancedStand { duration_ms: 100 },
        ));
        assert_eq!(result["status"], "balanced_stand_complete");

        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::DisableBalance,
        ));
        assert_eq!(result["status"], "balance_disabled");
        assert!(!engine.is_balance_enabled());
    }

    #[test]
    fn test_status_report_shape() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();
        engine.set_range_sensor(Box::new(SimRange::new(42.0)));
        temp.set_temperature_c(36.5);

        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::GetStatus,
        ));

        assert_eq!(result["distance_cm"], 42.0);
        assert_eq!(result["temperature_c"], 36.5);
        assert_eq!(result["servo_state"], "active");
        assert!(result["idle_ms"].is_null());
        assert_eq!(result["sent"], 0);
        assert_eq!(result["received"], 0);

        // After a movement the robot is resting and the idle clock runs
        exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::Forward {
                speed: 100.0,
                steps: 0.2,
            },
        );

        let result = expect_result(exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::GetStatus,
        ));
        assert_eq!(result["servo_state"], "resting");
        assert!(result["idle_ms"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_unknown_command_reports_in_result() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();

        let cmd = Command::Unknown("frobnicate".to_string());
        let result = expect_result(exec(&mut state, &mut engine, &mut temp, &mut handler, &cmd));

        assert_eq!(result["error"], "Unknown: frobnicate");
    }

    #[test]
    fn test_search_without_signal_is_an_error_response() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();

        let outcome = exec(
            &mut state,
            &mut engine,
            &mut temp,
            &mut handler,
            &Command::SignalSearch,
        );

        assert_eq!(
            outcome,
            DispatchOutcome::Respond {
                result: None,
                error: Some(
                    "Error: No signal strength readings received during the scan".to_string()
                )
            }
        );
        assert!(engine.is_resting());
    }

    #[test]
    fn test_home_and_stand() {
        let (mut state, mut engine, mut temp, mut handler) = fixture();

        exec(&mut state, &mut engine, &mut temp, &mut handler, &Command::Home);
        assert!(engine.is_resting());
        for i in 0..NUM_SERVOS {
            let angle = engine.driver.angle_deg(i as u8).unwrap();
            assert!((angle - 90.0).abs() < 1e-9);
        }

        exec(&mut state, &mut engine, &mut temp, &mut handler, &Command::Stand);
        let stand = GaitParams::default().stand_pose_deg;
        for i in 0..NUM_SERVOS {
            let angle = engine.driver.angle_deg(i as u8).unwrap();
            assert!((angle - stand[i]).abs() < 1e-9);
        }
    }
}
