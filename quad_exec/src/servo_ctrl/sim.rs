//! [`ServoDriver`] implementation recording writes, used in tests and benches

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::maths::lin_map;

use super::{ServoDriver, ServoError, MAX_ANGLE_DEG, MAX_PULSE_US, MIN_PULSE_US, NUM_CHANNELS};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A servo board which records the last pulse per channel instead of driving hardware.
#[derive(Debug, Clone, Default)]
pub struct SimServoBoard {
    pulses_us: [Option<f64>; NUM_CHANNELS as usize],

    write_counts: [u32; NUM_CHANNELS as usize],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServoBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last pulse written to a channel, `None` if the channel is off.
    pub fn pulse_us(&self, channel: u8) -> Option<f64> {
        self.pulses_us[channel as usize]
    }

    /// Last pulse converted back into the commanded angle.
    pub fn angle_deg(&self, channel: u8) -> Option<f64> {
        self.pulse_us(channel).map(|p| {
            lin_map((MIN_PULSE_US, MAX_PULSE_US), (0.0, MAX_ANGLE_DEG), p)
        })
    }

    /// Number of writes the channel has seen.
    pub fn write_count(&self, channel: u8) -> u32 {
        self.write_counts[channel as usize]
    }
}

impl ServoDriver for SimServoBoard {
    fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError> {
        if channel >= NUM_CHANNELS {
            return Err(ServoError::InvalidChannel(channel));
        }
        if pulse_us < MIN_PULSE_US || pulse_us > MAX_PULSE_US {
            return Err(ServoError::InvalidPulse(pulse_us));
        }

        self.pulses_us[channel as usize] = Some(pulse_us);
        self.write_counts[channel as usize] += 1;

        Ok(())
    }

    fn disable(&mut self, channel: u8) -> Result<(), ServoError> {
        if channel >= NUM_CHANNELS {
            return Err(ServoError::InvalidChannel(channel));
        }

        self.pulses_us[channel as usize] = None;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_board_records_writes() {
        let mut board = SimServoBoard::new();

        board.set_pulse_us(3, 1500.0).unwrap();
        assert_eq!(board.pulse_us(3), Some(1500.0));
        assert_eq!(board.angle_deg(3), Some(90.0));
        assert_eq!(board.write_count(3), 1);

        board.disable(3).unwrap();
        assert_eq!(board.pulse_us(3), None);

        assert!(matches!(
            board.set_pulse_us(16, 1500.0),
            Err(ServoError::InvalidChannel(16))
        ));
        assert!(matches!(
            board.set_pulse_us(0, 100.0),
            Err(ServoError::InvalidPulse(_))
        ));
    }
}
