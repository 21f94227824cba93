//! # Servo oscillator
//!
//! Each leg servo is driven by an [`Oscillator`], which generates a sinusoidal
//! position signal `A*sin(phase + phase0) + O` about the servo's centre (90
//! degrees). Gaits are built by running all eight oscillators with different
//! amplitude/offset/period/phase parameter sets.
//!
//! The oscillator resamples its position at a fixed [`SAMPLE_PERIOD_MS`]
//! cadence. The phase accumulator advances once per sample window even while
//! the oscillator is stopped, so that stopped and running servos stay
//! coordinated when a gait resumes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::PI;

use crate::servo_ctrl::{angle_to_pulse_us, ServoDriver, ServoError, MAX_ANGLE_DEG};
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time between oscillator position updates.
///
/// Units: milliseconds
pub const SAMPLE_PERIOD_MS: f64 = 30.0;

/// Centre angle of a servo's travel, about which oscillations occur.
///
/// Units: degrees
pub const CENTRE_ANGLE_DEG: f64 = 90.0;

/// Default oscillation amplitude applied on attach.
///
/// Units: degrees
const DEFAULT_AMPLITUDE_DEG: f64 = 45.0;

/// Default oscillation period applied on attach.
///
/// Units: milliseconds
const DEFAULT_PERIOD_MS: f64 = 2000.0;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A single servo output channel with its trim calibration.
///
/// The channel owns the trim: every commanded angle has the trim added and is
/// then clamped into `[0, MAX_ANGLE_DEG]` before being converted to a pulse
/// width, so no caller can drive the horn outside its mechanical range.
pub struct ServoChannel {
    /// Output channel index on the servo board.
    channel: u8,

    /// Calibration trim added to every commanded angle.
    ///
    /// Units: degrees
    trim_deg: f64,

    /// Last angle written to the board, after trim and clamping.
    ///
    /// Units: degrees
    last_angle_deg: f64,

    /// Whether the channel has been written since the last detach.
    attached: bool,
}

/// Sinusoidal position generator for one servo channel.
pub struct Oscillator {
    channel: ServoChannel,

    /// Oscillation amplitude.
    ///
    /// Units: degrees
    amplitude_deg: f64,

    /// Oscillation offset from the centre angle.
    ///
    /// Units: degrees
    offset_deg: f64,

    /// Oscillation period.
    ///
    /// Units: milliseconds
    period_ms: f64,

    /// Running phase accumulator.
    ///
    /// Units: radians
    phase_rad: f64,

    /// Initial phase of this servo within the gait.
    ///
    /// Units: radians
    phase0_rad: f64,

    /// Phase increment per sample window, `2*pi / (period / sample period)`.
    ///
    /// Units: radians
    inc_rad: f64,

    /// Time of the last fired sample window.
    ///
    /// Units: milliseconds
    prev_sample_ms: u64,

    /// When stopped the oscillator writes no positions but keeps phasing.
    stopped: bool,

    /// Mirror the output about the centre angle (for servos mounted opposite
    /// to their pair).
    reversed: bool,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl ServoChannel {
    /// Create a new channel with the given trim calibration.
    pub fn new(channel: u8, trim_deg: f64) -> Self {
        Self {
            channel,
            trim_deg,
            last_angle_deg: CENTRE_ANGLE_DEG,
            attached: false,
        }
    }

    /// Command the servo to `angle_deg`.
    ///
    /// The channel trim is added and the result clamped into
    /// `[0, MAX_ANGLE_DEG]` before conversion to a pulse width.
    pub fn write<D: ServoDriver>(
        &mut self,
        driver: &mut D,
        angle_deg: f64,
    ) -> Result<(), ServoError> {
        let trimmed_deg = clamp(&(angle_deg + self.trim_deg), &0.0, &MAX_ANGLE_DEG);

        driver.set_pulse_us(self.channel, angle_to_pulse_us(trimmed_deg))?;

        self.last_angle_deg = trimmed_deg;
        self.attached = true;

        Ok(())
    }

    /// Cut the PWM output, letting the servo go limp.
    pub fn detach<D: ServoDriver>(&mut self, driver: &mut D) -> Result<(), ServoError> {
        driver.disable(self.channel)?;
        self.attached = false;
        Ok(())
    }

    /// Last angle written to the board, after trim and clamping.
    pub fn last_angle_deg(&self) -> f64 {
        self.last_angle_deg
    }

    /// Whether the channel has been written since the last detach.
    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl Oscillator {
    /// Create a new oscillator for the given board channel and trim.
    ///
    /// The oscillator starts detached and stopped. [`Oscillator::attach`]
    /// must be called before it will drive the servo.
    pub fn new(channel: u8, trim_deg: f64) -> Self {
        Self {
            channel: ServoChannel::new(channel, trim_deg),
            amplitude_deg: DEFAULT_AMPLITUDE_DEG,
            offset_deg: 0.0,
            period_ms: DEFAULT_PERIOD_MS,
            phase_rad: 0.0,
            phase0_rad: 0.0,
            inc_rad: 2.0 * PI / (DEFAULT_PERIOD_MS / SAMPLE_PERIOD_MS),
            prev_sample_ms: 0,
            stopped: true,
            reversed: false,
        }
    }

    /// Power the servo at its centre angle and reset the oscillation
    /// parameters to their defaults.
    ///
    /// A no-op when the servo is already attached, so back-to-back gaits do
    /// not disturb the running phase accumulator.
    pub fn attach<D: ServoDriver>(
        &mut self,
        driver: &mut D,
        reverse: bool,
    ) -> Result<(), ServoError> {
        if self.channel.is_attached() {
            return Ok(());
        }

        self.channel.write(driver, CENTRE_ANGLE_DEG)?;

        self.amplitude_deg = DEFAULT_AMPLITUDE_DEG;
        self.offset_deg = 0.0;
        self.phase_rad = 0.0;
        self.phase0_rad = 0.0;
        self.prev_sample_ms = 0;
        self.stopped = false;
        self.reversed = reverse;
        self.set_period_ms(DEFAULT_PERIOD_MS);

        Ok(())
    }

    /// Cut the servo's PWM output.
    pub fn detach<D: ServoDriver>(&mut self, driver: &mut D) -> Result<(), ServoError> {
        self.channel.detach(driver)
    }

    /// Advance the oscillator by one tick.
    ///
    /// Writes a new position at most once per [`SAMPLE_PERIOD_MS`] window.
    /// The phase accumulator advances on every fired window, stopped or not.
    /// `correction_deg` is added to the computed position before the trim and
    /// range clamp are applied.
    pub fn refresh<D: ServoDriver>(
        &mut self,
        driver: &mut D,
        now_ms: u64,
        correction_deg: f64,
    ) -> Result<(), ServoError> {
        if (now_ms.saturating_sub(self.prev_sample_ms) as f64) <= SAMPLE_PERIOD_MS {
            return Ok(());
        }
        self.prev_sample_ms = now_ms;

        if !self.stopped {
            let mut pos_deg = (self.amplitude_deg * (self.phase_rad + self.phase0_rad).sin()
                + self.offset_deg)
                .round();

            if self.reversed {
                pos_deg = -pos_deg;
            }

            self.channel
                .write(driver, pos_deg + CENTRE_ANGLE_DEG + correction_deg)?;
        }

        self.phase_rad += self.inc_rad;

        Ok(())
    }

    /// Drive the servo straight to an absolute angle, bypassing the
    /// oscillation. `angle_deg` is trimmed and clamped by the channel.
    pub fn set_position<D: ServoDriver>(
        &mut self,
        driver: &mut D,
        angle_deg: f64,
    ) -> Result<(), ServoError> {
        self.channel.write(driver, angle_deg)
    }

    /// Set the oscillation amplitude in degrees.
    pub fn set_amplitude_deg(&mut self, amplitude_deg: f64) {
        self.amplitude_deg = amplitude_deg;
    }

    /// Set the oscillation offset in degrees.
    pub fn set_offset_deg(&mut self, offset_deg: f64) {
        self.offset_deg = offset_deg;
    }

    /// Set the initial phase in radians.
    pub fn set_phase0_rad(&mut self, phase0_rad: f64) {
        self.phase0_rad = phase0_rad;
    }

    /// Set the oscillation period and rescale the per-window phase increment
    /// to match. The running phase accumulator is not altered.
    pub fn set_period_ms(&mut self, period_ms: f64) {
        self.period_ms = period_ms;

        let num_samples = period_ms / SAMPLE_PERIOD_MS;
        self.inc_rad = 2.0 * PI / num_samples;
    }

    /// Stop writing positions. The phase accumulator keeps advancing.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Resume writing positions.
    pub fn play(&mut self) {
        self.stopped = false;
    }

    /// The oscillation period in milliseconds.
    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// The running phase accumulator in radians.
    pub fn phase_rad(&self) -> f64 {
        self.phase_rad
    }

    /// Whether position writes are currently suppressed.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The underlying servo channel.
    pub fn channel(&self) -> &ServoChannel {
        &self.channel
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::sim::SimServoBoard;

    #[test]
    fn test_attach_centres_servo() {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 0.0);

        osc.attach(&mut board, false).unwrap();
        assert!((board.angle_deg(0).unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(board.write_count(0), 1);
        assert!(!osc.is_stopped());

        // A second attach must not disturb the servo
        osc.attach(&mut board, false).unwrap();
        assert_eq!(board.write_count(0), 1);

        // Trim shifts the centre write
        let mut trimmed = Oscillator::new(1, 5.0);
        trimmed.attach(&mut board, false).unwrap();
        assert!((board.angle_deg(1).unwrap() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_gates_on_sample_period() {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 0.0);
        osc.attach(&mut board, false).unwrap();

        // Inside the first sample window nothing fires
        osc.refresh(&mut board, 10, 0.0).unwrap();
        osc.refresh(&mut board, 30, 0.0).unwrap();
        assert_eq!(board.write_count(0), 1);
        assert!((osc.phase_rad() - 0.0).abs() < 1e-12);

        // First fired window writes sin(0) = centre
        osc.refresh(&mut board, 31, 0.0).unwrap();
        assert_eq!(board.write_count(0), 2);
        assert!((board.angle_deg(0).unwrap() - 90.0).abs() < 1e-9);

        // Second window: phase has advanced by one increment,
        // round(45 * sin(2*pi/66.67)) = 4 degrees above centre
        osc.refresh(&mut board, 62, 0.0).unwrap();
        assert_eq!(board.write_count(0), 3);
        assert!((board.angle_deg(0).unwrap() - 94.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_and_play_preserve_phase() {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 0.0);
        osc.attach(&mut board, false).unwrap();
        osc.stop();

        let inc = 2.0 * PI / (2000.0 / SAMPLE_PERIOD_MS);
        let mut now_ms = 0u64;
        for _ in 0..5 {
            now_ms += 31;
            osc.refresh(&mut board, now_ms, 0.0).unwrap();
        }

        assert!((osc.phase_rad() - 5.0 * inc).abs() < 1e-9);

        // Only the attach write happened
        assert_eq!(board.write_count(0), 1);

        // Resuming picks up at the accumulated phase,
        // round(45 * sin(5 * 2*pi/66.67)) = 20 degrees above centre
        osc.play();
        osc.refresh(&mut board, now_ms + 31, 0.0).unwrap();
        assert_eq!(board.write_count(0), 2);
        assert!((board.angle_deg(0).unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_reversed_channel_mirrors_output() {
        let mut board = SimServoBoard::default();

        let mut fwd = Oscillator::new(0, 0.0);
        fwd.attach(&mut board, false).unwrap();
        fwd.set_phase0_rad(PI / 2.0);

        let mut rev = Oscillator::new(1, 0.0);
        rev.attach(&mut board, true).unwrap();
        rev.set_phase0_rad(PI / 2.0);

        // At phase pi/2 the position is the full +45 amplitude
        fwd.refresh(&mut board, 31, 0.0).unwrap();
        rev.refresh(&mut board, 31, 0.0).unwrap();

        assert!((board.angle_deg(0).unwrap() - 135.0).abs() < 1e-9);
        assert!((board.angle_deg(1).unwrap() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_period_rescales_increment() {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 0.0);
        osc.attach(&mut board, false).unwrap();
        osc.set_period_ms(1000.0);

        osc.refresh(&mut board, 31, 0.0).unwrap();

        let expected = 2.0 * PI / (1000.0 / SAMPLE_PERIOD_MS);
        assert!((osc.phase_rad() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_set_position_trims_and_clamps() {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 10.0);
        osc.attach(&mut board, false).unwrap();

        osc.set_position(&mut board, 175.0).unwrap();
        assert!((board.angle_deg(0).unwrap() - 180.0).abs() < 1e-9);

        osc.set_position(&mut board, -20.0).unwrap();
        assert!((board.angle_deg(0).unwrap() - 0.0).abs() < 1e-9);

        // Channel bookkeeping tracks the clamped write
        assert!((osc.channel().last_angle_deg() - 0.0).abs() < 1e-9);
        assert!(osc.channel().is_attached());
    }

    #[test]
    fn test_correction_shifts_refresh_output() {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 0.0);
        osc.attach(&mut board, false).unwrap();

        // sin(0) = 0, so the write is centre plus the correction
        osc.refresh(&mut board, 31, 7.0).unwrap();
        assert!((board.angle_deg(0).unwrap() - 97.0).abs() < 1e-9);
    }
}
