//! # Servo Controller Module
//!
//! This module provides a unified servo control interface which can abstract over different types
//! of servo driver boards. The servos themselves are standard 500 to 2500 microsecond pulse width
//! hobby servos with a 180 degree range, driven at a 50 Hz frame rate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

/// [`ServoDriver`] implementation recording writes in memory, for tests and benches.
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::maths::lin_map;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pulse width commanding 0 degrees.
///
/// Units: microseconds
pub const MIN_PULSE_US: f64 = 500.0;

/// Pulse width commanding 180 degrees.
///
/// Units: microseconds
pub const MAX_PULSE_US: f64 = 2500.0;

/// Full servo travel.
///
/// Units: degrees
pub const MAX_ANGLE_DEG: f64 = 180.0;

/// Number of channels on the driver boards supported so far.
pub const NUM_CHANNELS: u8 = 16;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
pub trait ServoDriver {
    /// Command a pulse width on a channel.
    ///
    /// Implementations re-enable the channel's output if it was disabled.
    fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError>;

    /// Stop driving a channel, leaving the servo unpowered and free to move.
    fn disable(&mut self, channel: u8) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Channel {0} is not available on this driver")]
    InvalidChannel(u8),

    #[error("Pulse width of {0} us is outside the servo's range")]
    InvalidPulse(f64),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a servo angle into its pulse width.
///
/// The mapping is the same for every channel: 0 degrees is 500 us, 180 degrees is 2500 us,
/// linear in between. The caller is responsible for clamping the angle into [0, 180] first.
pub fn angle_to_pulse_us(angle_deg: f64) -> f64 {
    lin_map(
        (0.0, MAX_ANGLE_DEG),
        (MIN_PULSE_US, MAX_PULSE_US),
        angle_deg,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_angle_to_pulse() {
        assert_eq!(angle_to_pulse_us(0.0), 500.0);
        assert_eq!(angle_to_pulse_us(90.0), 1500.0);
        assert_eq!(angle_to_pulse_us(180.0), 2500.0);
        assert_eq!(angle_to_pulse_us(45.0), 1000.0);
    }
}
