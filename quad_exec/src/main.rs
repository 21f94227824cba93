//! Main quadruped executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Bring up the servo board, sensors and radio link
//!     - Run the staged startup sequence into the standing pose
//!     - Main loop:
//!         - Periodic telemetry (range and chip temperature)
//!         - Command acquisition from the radio link or a script
//!         - Command execution through the command processor
//!         - Cycle management
//!
//! Commands come either from the radio bridge or, when a single command line
//! argument is given, from a timed command script. In script mode the radio
//! link is replaced by a null link which drops all telemetry.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

#[cfg(target_arch = "arm")]
use quad_lib::imu::Mpu6500;
#[cfg(target_arch = "arm")]
use quad_lib::sensors::{CpuThermo, Hcsr04};
#[cfg(not(target_arch = "arm"))]
use quad_lib::sensors::{SimRange, SimTemp};
#[cfg(target_arch = "arm")]
use quad_lib::servo_ctrl::pca9685;
#[cfg(not(target_arch = "arm"))]
use quad_lib::servo_ctrl::sim::SimServoBoard;
use quad_lib::{
    cmd_processor::{self, DispatchOutcome, ExecState},
    gait::GaitEngine,
    params::QuadExecParams,
    sensors::TempSensor,
};
use radio_if::{
    handler::ProtocolHandler,
    msg::InboundEvent,
    net::{NetParams, NullLink, RadioLink, ZmqLink},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter},
    script_interpreter::{PendingCommands, ScriptInterpreter},
    session::Session,
    time::MonoClock,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Cycles between sensor telemetry sends, 1 Hz at the cycle rate.
const SENSOR_DATA_CYCLES: u64 = 10;

/// Cycles between chip temperature refreshes. Reads are slow, so the latest
/// value is cached between refreshes.
const TEMP_REFRESH_CYCLES: u64 = 50;

/// Wait on the radio link for inbound datagrams each cycle.
///
/// Units: milliseconds
const RECV_TIMEOUT_MS: u64 = 10;

/// Duration of each staged startup move.
///
/// Units: milliseconds
const STARTUP_STAGE_MS: u64 = 500;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("quad_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Tarsus Quadruped Executable\n");
    info!("Running on: {}", host::get_host_desc());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    let exec_params: QuadExecParams =
        util::params::load("quad_exec.toml").wrap_err("Could not load quad_exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE COMMAND SOURCE ----

    // The command source determines whether we're getting commands from a
    // script or from the radio master.
    let mut cmd_source = CmdSource::Radio;

    // Collect all arguments
    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    // If we have a single argument use it as the script path
    if args.len() == 2 {
        info!("Loading script from \"{}\"", &args[1]);

        // Load the script interpreter
        let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

        // Display some info
        info!(
            "Loaded script lasts {:.02} s and contains {} commands\n",
            si.get_duration(),
            si.get_num_cmds()
        );

        cmd_source = CmdSource::Script(si);
    }
    // If no arguments command over the radio link
    else if args.len() == 1 {
        info!("No script provided, remote control over the radio link will be used\n");
    } else {
        return Err(eyre!(
            "Expected either zero or one argument, found {}",
            args.len() - 1
        ));
    }

    // ---- INITIALISE HARDWARE ----

    info!("Initialising hardware...");

    #[cfg(target_arch = "arm")]
    let driver = {
        let i2c = rppal::i2c::I2c::new().wrap_err("Failed to open the I2C bus")?;
        let d = pca9685::init(i2c, exec_params.servo_board_addr)
            .wrap_err("Failed to initialise the servo board")?;
        info!("Servo board initialised");
        d
    };

    #[cfg(not(target_arch = "arm"))]
    let driver = {
        info!("Not running on the robot, using the simulated servo board");
        SimServoBoard::default()
    };

    let mut engine = GaitEngine::new(driver, MonoClock::new(), &exec_params.gait);

    #[cfg(target_arch = "arm")]
    {
        let range = Hcsr04::new(exec_params.range_trigger_pin, exec_params.range_echo_pin)
            .wrap_err("Failed to initialise the range sensor")?;
        engine.set_range_sensor(Box::new(range));
        info!("Range sensor initialised");
    }

    #[cfg(not(target_arch = "arm"))]
    engine.set_range_sensor(Box::new(SimRange::new(exec_params.sim_range_cm)));

    #[cfg(target_arch = "arm")]
    let mut temp_sensor: Box<dyn TempSensor> =
        Box::new(CpuThermo::new(exec_params.temp_offset_c));

    #[cfg(not(target_arch = "arm"))]
    let mut temp_sensor: Box<dyn TempSensor> = Box::new(SimTemp::new(exec_params.sim_temp_c));

    // The IMU is brought up as a boot check, a fitted balance controller
    // re-uses the bus later
    #[cfg(target_arch = "arm")]
    if exec_params.imu_enabled {
        let i2c = rppal::i2c::I2c::new().wrap_err("Failed to open the I2C bus for the IMU")?;
        let mut imu =
            Mpu6500::new(i2c, &exec_params.imu).wrap_err("Failed to initialise the MPU6500")?;

        let bias_dps = imu
            .calibrate_gyro(exec_params.imu.calib_samples)
            .wrap_err("Gyro calibration failed")?;
        info!(
            "Gyro bias: [{:+.3}, {:+.3}, {:+.3}] dps",
            bias_dps[0], bias_dps[1], bias_dps[2]
        );

        match imu.temperature_c() {
            Ok(t) => info!("IMU die temperature: {:.1} C", t),
            Err(e) => warn!("Could not read the IMU temperature: {}", e),
        }
    }

    info!("Hardware initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = radio_if::net::zmq::Context::new();

    let link: Box<dyn RadioLink> = match cmd_source {
        CmdSource::Radio => {
            let l = ZmqLink::new(&zmq_ctx, &net_params)
                .wrap_err("Failed to open the radio link")?;
            info!("Radio link initialised");
            Box::new(l)
        }
        CmdSource::Script(_) => {
            info!("Script mode, outbound telemetry will be dropped");
            Box::new(NullLink)
        }
    };

    let mut handler = ProtocolHandler::new(link);

    info!("Network initialisation complete");

    // ---- STARTUP SEQUENCE ----

    engine.init().wrap_err("Failed to power the servos")?;
    engine
        .startup(STARTUP_STAGE_MS)
        .wrap_err("Startup sequence failed")?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut exec_state = ExecState::default();
    let mut num_cycles: u64 = 0;
    let mut cached_temp_c = 0.0;

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- TELEMETRY ----

        if num_cycles % TEMP_REFRESH_CYCLES == 0 {
            cached_temp_c = temp_sensor.temperature_c();

            if cached_temp_c > exec_params.overheat_threshold_c {
                warn!("Chip overheating: {:.1} C", cached_temp_c);

                if let Err(e) = handler.send_alert(
                    "overheat",
                    &format!("Chip temperature {:.1} C", cached_temp_c),
                ) {
                    warn!("Could not send the overheat alert: {}", e);
                }
            }
        }

        if num_cycles % SENSOR_DATA_CYCLES == 0 {
            let distance_cm = engine.distance_cm();
            let status = if distance_cm < 0.0 {
                "NO_OBJECT"
            } else if distance_cm < exec_params.gait.obstacle_threshold_cm {
                "OBSTACLE"
            } else {
                "OK"
            };

            if let Err(e) = handler.send_sensor_data(distance_cm, cached_temp_c, status) {
                warn!("Could not send sensor data: {}", e);
            }
        }

        // ---- COMMAND PROCESSING ----

        // Branch depending on the source
        match cmd_source {
            CmdSource::Radio => match handler.receive(RECV_TIMEOUT_MS) {
                Ok(Some(InboundEvent::Command { cmd, .. })) => {
                    let outcome = cmd_processor::exec(
                        &mut exec_state,
                        &mut engine,
                        temp_sensor.as_mut(),
                        &mut handler,
                        &cmd,
                    );
                    respond(&mut handler, outcome);
                }
                Ok(Some(InboundEvent::Structured { source, data, .. })) => {
                    debug!("Telemetry from {}: {}", source, data);
                }
                // Unknown and undecodable payloads are already logged and
                // counted by the handler
                Ok(Some(_)) => (),
                Ok(None) => (),
                Err(e) => warn!("Radio receive error: {}", e),
            },

            CmdSource::Script(ref mut si) => match si.get_pending_cmds() {
                PendingCommands::None => (),
                PendingCommands::Some(cmd_vec) => {
                    for cmd in cmd_vec.iter() {
                        let outcome = cmd_processor::exec(
                            &mut exec_state,
                            &mut engine,
                            temp_sensor.as_mut(),
                            &mut handler,
                            cmd,
                        );
                        respond(&mut handler, outcome);
                    }
                }
                // Exit if end of script reached
                PendingCommands::EndOfScript => {
                    info!("End of command script reached, stopping");
                    break;
                }
            },
        };

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
            }
        }

        // Increment cycle counter
        num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    engine
        .detach_all()
        .wrap_err("Failed to detach the servos")?;

    info!("End of execution");

    Ok(())
}

/// Send the command processor's outcome to the master, if it produced one.
fn respond<L: RadioLink>(handler: &mut ProtocolHandler<L>, outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Skipped => (),
        DispatchOutcome::Respond { result, error } => {
            if let Err(e) = handler.send_response(result, error) {
                warn!("Could not send the command response: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Sources of the commands incoming to the exec.
enum CmdSource {
    Radio,
    Script(ScriptInterpreter),
}
