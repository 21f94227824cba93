//! # Quadruped library.
//!
//! This library allows other crates in the workspace (and the benches) to
//! access items defined inside the quadruped executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command processor - executes decoded commands against the gait engine
pub mod cmd_processor;

/// Gait engine - coordinates the eight servo oscillators into walks, turns and poses
pub mod gait;

/// Inertial measurement unit driver - register level MPU6500 access over I2C
pub mod imu;

/// Parameters for the quadruped executable
pub mod params;

/// Range and temperature sensor seams
pub mod sensors;

/// Servo driver - abstracts over PWM servo boards
pub mod servo_ctrl;

/// Signal search - rotates to find the heading with the strongest master signal
pub mod signal_search;
