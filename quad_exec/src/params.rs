//! # Executable parameters
//!
//! Top level parameter structure for the quadruped executable, loaded from
//! `quad_exec.toml` in the parameters directory. Subsystem parameters live
//! with their modules and are pulled in here as nested tables.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::gait::GaitParams;
use crate::imu::ImuConfig;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters for the quadruped executable.
#[derive(Clone, Debug, Deserialize)]
pub struct QuadExecParams {
    // ---- SERVO BOARD ----
    /// I2C bus address of the PCA9685 servo board.
    pub servo_board_addr: u8,

    // ---- RANGE SENSOR ----
    /// GPIO pin driving the range sensor trigger.
    pub range_trigger_pin: u8,

    /// GPIO pin reading the range sensor echo.
    pub range_echo_pin: u8,

    /// Range reading reported by the simulation sensor when running without
    /// hardware.
    ///
    /// Units: centimeters
    pub sim_range_cm: f64,

    // ---- THERMAL ----
    /// Calibration offset added to hardware temperature readings.
    ///
    /// Units: degrees Celsius
    pub temp_offset_c: f64,

    /// Temperature reported by the simulation sensor when running without
    /// hardware.
    ///
    /// Units: degrees Celsius
    pub sim_temp_c: f64,

    /// Temperature above which an overheat alert is sent to the operator.
    ///
    /// Units: degrees Celsius
    pub overheat_threshold_c: f64,

    // ---- IMU ----
    /// Whether an IMU is fitted and should be brought up at boot.
    pub imu_enabled: bool,

    /// IMU driver parameters.
    pub imu: ImuConfig,

    // ---- GAIT ----
    /// Gait engine parameters.
    pub gait: GaitParams,
}
