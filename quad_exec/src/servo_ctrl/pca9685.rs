//! [`ServoDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Address, Channel, Pca9685};

use super::{ServoDriver, ServoError, MAX_PULSE_US, MIN_PULSE_US};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Counts in one PWM frame.
const MAX_PWM: u16 = 4096;

/// Length of one 50 Hz PWM frame.
///
/// Units: microseconds
const FRAME_US: f64 = 20_000.0;

/// Prescale setting the 50 Hz frame rate from the board's 25 MHz internal oscillator,
/// `round(25 MHz / (4096 * 50 Hz)) - 1`.
const PRESCALE_50_HZ: u8 = 121;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Bring up a PCA9685 at the given I2C address.
///
/// The board comes back configured for the servos' 50 Hz frame rate with every output off, so
/// the servos stay unpowered until the first write.
pub fn init<I2C, E>(i2c: I2C, address: u8) -> Result<Pca9685<I2C>, ServoError>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    let mut pwm = Pca9685::new(i2c, Address::from(address)).map_err(|_| ServoError::I2c)?;

    // Prescale can only be set while the board sleeps, which it does out of reset
    pwm.set_prescale(PRESCALE_50_HZ).map_err(|_| ServoError::I2c)?;
    pwm.set_channel_full_off(Channel::All)
        .map_err(|_| ServoError::I2c)?;
    pwm.enable().map_err(|_| ServoError::I2c)?;

    Ok(pwm)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> ServoDriver for Pca9685<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError> {
        // Pulses outside the servo's range would hit the end stops
        if pulse_us < MIN_PULSE_US || pulse_us > MAX_PULSE_US {
            return Err(ServoError::InvalidPulse(pulse_us));
        }

        let ticks = (pulse_us * (MAX_PWM as f64) / FRAME_US).round() as u16;

        match self.set_channel_on_off(channel_from_u8(channel)?, 0, ticks) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(_)) => Err(ServoError::I2c),
            Err(pwm_pca9685::Error::InvalidInputData) => Err(ServoError::InvalidPulse(pulse_us)),
        }
    }

    fn disable(&mut self, channel: u8) -> Result<(), ServoError> {
        match self.set_channel_full_off(channel_from_u8(channel)?) {
            Ok(_) => Ok(()),
            Err(_) => Err(ServoError::I2c),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Map a channel index onto the driver's channel type.
fn channel_from_u8(channel: u8) -> Result<Channel, ServoError> {
    let ch = match channel {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return Err(ServoError::InvalidChannel(channel)),
    };

    Ok(ch)
}
