//! # Gait engine
//!
//! Coordinates the robot's eight servos (four hips, four legs) to produce
//! walking, turning and posing motions.
//!
//! Motions come in two flavours:
//!
//! - **Keyframe moves** ([`GaitEngine::move_servos_to`]): linear interpolation
//!   of every servo from its last known angle to a target pose over a fixed
//!   duration, stepped at a 10 ms cadence.
//! - **Oscillating gaits** ([`GaitEngine::execute`]): all eight oscillators
//!   run a [`patterns::GaitPattern`] parameter set for a number of cycles,
//!   producing the rhythmic leg motion of the walking and dancing gaits.
//!
//! Gait offsets are applied about the stand pose rather than the mechanical
//! centre, so oscillations happen around the robot's natural standing
//! posture.
//!
//! When a [`BalanceController`] is fitted and enabled its per-servo
//! corrections are added to every commanded angle, keyframed or oscillated,
//! before the servo range clamp. Directional gaits consult the range sensor
//! first and refuse to start into an obstacle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod osc;
pub mod patterns;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::sensors::RangeSensor;
use crate::servo_ctrl::{ServoDriver, ServoError};
use util::time::Clock;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use osc::{Oscillator, ServoChannel, CENTRE_ANGLE_DEG, SAMPLE_PERIOD_MS};
pub use patterns::GaitPattern;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of servos on the robot: four hips and four legs.
pub const NUM_SERVOS: usize = 8;

/// Duration of the default stand/home pose transitions.
///
/// Units: milliseconds
pub const STAND_DURATION_MS: u64 = 500;

/// Correction update cadence during a balanced stand.
///
/// Units: milliseconds
pub const BALANCE_UPDATE_PERIOD_MS: u64 = 20;

/// Interpolation step length for keyframe moves.
///
/// Units: milliseconds
const KEYFRAME_STEP_MS: u64 = 10;

/// Period of a single quarter turn while scanning.
///
/// Units: milliseconds
const SCAN_TURN_PERIOD_MS: f64 = 1500.0;

/// Settle time between the staged startup poses.
///
/// Units: milliseconds
const STARTUP_SETTLE_MS: u64 = 200;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while running a motion.
#[derive(Debug, Error)]
pub enum GaitError {
    #[error("Servo drive error: {0}")]
    Servo(#[from] ServoError),

    #[error("Obstacle detected {distance_cm:.1} cm ahead")]
    ObstacleDetected { distance_cm: f64 },
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Contract for an attitude controller which turns IMU samples into per-servo
/// balance corrections.
///
/// The engine calls [`BalanceController::update`] at most once per control
/// tick, and only while balance is enabled. Without a controller the
/// correction vector is always zero.
pub trait BalanceController {
    /// Measure the gyro bias. The robot must be still and level.
    fn calibrate(&mut self);

    /// Begin producing corrections.
    fn enable(&mut self);

    /// Stop producing corrections.
    fn disable(&mut self);

    /// The current correction for each servo, in the engine's canonical
    /// servo order.
    ///
    /// Units: degrees
    fn update(&mut self) -> [f64; NUM_SERVOS];

    /// Current `(roll, pitch)` attitude.
    ///
    /// Units: degrees
    fn angles(&mut self) -> (f64, f64);

    /// Whether either attitude angle exceeds the threshold.
    fn is_tilted(&mut self, threshold_deg: f64) -> bool {
        let (roll_deg, pitch_deg) = self.angles();
        roll_deg.abs() > threshold_deg || pitch_deg.abs() > threshold_deg
    }

    /// Whether the robot has tipped past the point of self-recovery.
    fn is_fallen(&mut self, threshold_deg: f64) -> bool {
        let (roll_deg, pitch_deg) = self.angles();
        roll_deg.abs() > threshold_deg || pitch_deg.abs() > threshold_deg
    }
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters for the gait engine.
///
/// Servo arrays are in the canonical order: front right hip, front left hip,
/// front right leg, front left leg, back right hip, back left hip, back
/// right leg, back left leg.
#[derive(Clone, Debug, Deserialize)]
pub struct GaitParams {
    // ---- SERVO FITTING ----
    /// Servo board output channel for each servo.
    pub servo_channels: [u8; NUM_SERVOS],

    /// Calibration trim for each servo.
    ///
    /// Units: degrees
    pub servo_trims_deg: [f64; NUM_SERVOS],

    /// Whether each servo is mounted mirrored about its centre.
    pub servo_reversed: [bool; NUM_SERVOS],

    // ---- POSTURE ----
    /// Standing pose angle for each servo.
    ///
    /// Units: degrees
    pub stand_pose_deg: [f64; NUM_SERVOS],

    // ---- OBSTACLE AVOIDANCE ----
    /// Range readings below this block forward motion.
    ///
    /// Units: centimeters
    pub obstacle_threshold_cm: f64,
}

/// The gait engine itself.
///
/// Owns the eight oscillators, the servo board driver and the motion clock.
/// All motion methods block until the motion completes.
pub struct GaitEngine<D: ServoDriver, C: Clock> {
    pub(crate) driver: D,
    pub(crate) clock: C,
    pub(crate) oscillators: [Oscillator; NUM_SERVOS],

    /// Mirror flag per servo, applied when the servo attaches.
    reversed: [bool; NUM_SERVOS],

    /// Last commanded angle per servo, before trim and corrections.
    ///
    /// Units: degrees
    positions_deg: [f64; NUM_SERVOS],

    /// Standing pose.
    ///
    /// Units: degrees
    stand_pose_deg: [f64; NUM_SERVOS],

    /// Stand pose relative to the mechanical centre, added to gait offsets
    /// so oscillations are centred on the standing posture.
    ///
    /// Units: degrees
    stand_offsets_deg: [f64; NUM_SERVOS],

    /// True when the robot is parked in a stable pose.
    resting: bool,

    obstacle_threshold_cm: f64,
    range_sensor: Option<Box<dyn RangeSensor>>,

    balance_controller: Option<Box<dyn BalanceController>>,
    balance_enabled: bool,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for GaitParams {
    fn default() -> Self {
        Self {
            servo_channels: [0, 1, 2, 3, 4, 5, 6, 7],
            servo_trims_deg: [0.0; NUM_SERVOS],
            servo_reversed: [false; NUM_SERVOS],
            stand_pose_deg: [140.0, 40.0, 155.0, 25.0, 40.0, 140.0, 25.0, 140.0],
            obstacle_threshold_cm: 20.0,
        }
    }
}

impl<D: ServoDriver, C: Clock> GaitEngine<D, C> {
    /// Create a new engine from the given driver, clock and parameters.
    ///
    /// No servo is powered until [`GaitEngine::init`] or a motion method is
    /// called.
    pub fn new(driver: D, clock: C, params: &GaitParams) -> Self {
        let ch = &params.servo_channels;
        let tr = &params.servo_trims_deg;

        let oscillators = [
            Oscillator::new(ch[0], tr[0]),
            Oscillator::new(ch[1], tr[1]),
            Oscillator::new(ch[2], tr[2]),
            Oscillator::new(ch[3], tr[3]),
            Oscillator::new(ch[4], tr[4]),
            Oscillator::new(ch[5], tr[5]),
            Oscillator::new(ch[6], tr[6]),
            Oscillator::new(ch[7], tr[7]),
        ];

        let mut stand_offsets_deg = [0.0; NUM_SERVOS];
        for i in 0..NUM_SERVOS {
            stand_offsets_deg[i] = params.stand_pose_deg[i] - CENTRE_ANGLE_DEG;
        }

        Self {
            driver,
            clock,
            oscillators,
            reversed: params.servo_reversed,
            positions_deg: [CENTRE_ANGLE_DEG; NUM_SERVOS],
            stand_pose_deg: params.stand_pose_deg,
            stand_offsets_deg,
            resting: true,
            obstacle_threshold_cm: params.obstacle_threshold_cm,
            range_sensor: None,
            balance_controller: None,
            balance_enabled: false,
        }
    }

    /// Power all servos at their centre angles and reset the position
    /// bookkeeping.
    pub fn init(&mut self) -> Result<(), GaitError> {
        self.attach_all()?;
        self.resting = false;
        self.positions_deg = [CENTRE_ANGLE_DEG; NUM_SERVOS];
        Ok(())
    }

    /// Cut PWM output to all servos.
    pub fn detach_all(&mut self) -> Result<(), GaitError> {
        let GaitEngine {
            oscillators,
            driver,
            ..
        } = self;

        for osc in oscillators.iter_mut() {
            osc.detach(driver)?;
        }
        Ok(())
    }

    /// Fit the range sensor used for obstacle checks.
    pub fn set_range_sensor(&mut self, sensor: Box<dyn RangeSensor>) {
        self.range_sensor = Some(sensor);
    }

    /// Fit the balance controller. Corrections stay disabled until
    /// [`GaitEngine::enable_balance`] is called.
    pub fn set_balance_controller(&mut self, controller: Box<dyn BalanceController>) {
        self.balance_controller = Some(controller);
    }

    // ---- MOTION PRIMITIVES ----

    /// Move every servo from its last known angle to `target_deg` over
    /// `duration_ms`.
    ///
    /// Durations above 10 ms are linearly interpolated in 10 ms steps, with
    /// live balance corrections added at each step. Shorter durations apply
    /// the target directly. Position bookkeeping is updated to the target
    /// unconditionally on completion.
    pub fn move_servos_to(
        &mut self,
        duration_ms: u64,
        target_deg: [f64; NUM_SERVOS],
    ) -> Result<(), GaitError> {
        self.attach_all()?;
        self.resting = false;

        let GaitEngine {
            oscillators,
            driver,
            clock,
            balance_controller,
            balance_enabled,
            positions_deg,
            ..
        } = self;

        if duration_ms > KEYFRAME_STEP_MS {
            let step_count = duration_ms as f64 / KEYFRAME_STEP_MS as f64;

            let mut increments_deg = [0.0; NUM_SERVOS];
            for i in 0..NUM_SERVOS {
                increments_deg[i] = (target_deg[i] - positions_deg[i]) / step_count;
            }

            let final_ms = clock.now_ms() + duration_ms;
            let mut iteration = 1.0;

            while clock.now_ms() < final_ms {
                let step_end_ms = clock.now_ms() + KEYFRAME_STEP_MS;

                let corrections_deg = sample_corrections(balance_controller, *balance_enabled);

                for i in 0..NUM_SERVOS {
                    let angle_deg =
                        positions_deg[i] + iteration * increments_deg[i] + corrections_deg[i];
                    oscillators[i].set_position(driver, angle_deg)?;
                }

                clock.wait_until_ms(step_end_ms);
                iteration += 1.0;
            }
        } else {
            let corrections_deg = sample_corrections(balance_controller, *balance_enabled);

            for i in 0..NUM_SERVOS {
                oscillators[i].set_position(driver, target_deg[i] + corrections_deg[i])?;
            }
        }

        *positions_deg = target_deg;
        Ok(())
    }

    /// Run all eight oscillators with the given parameter sets for `cycle`
    /// periods of the base (index 0) period.
    ///
    /// Phases are radians here; [`GaitEngine::execute`] converts pattern
    /// tables from degrees. Balance corrections are resampled once per
    /// oscillator sample window.
    pub fn oscillate(
        &mut self,
        amplitude_deg: &[f64; NUM_SERVOS],
        offset_deg: &[f64; NUM_SERVOS],
        period_ms: &[f64; NUM_SERVOS],
        phase_rad: &[f64; NUM_SERVOS],
        cycle: f64,
    ) -> Result<(), GaitError> {
        let GaitEngine {
            oscillators,
            driver,
            clock,
            balance_controller,
            balance_enabled,
            ..
        } = self;

        for i in 0..NUM_SERVOS {
            oscillators[i].set_offset_deg(offset_deg[i]);
            oscillators[i].set_amplitude_deg(amplitude_deg[i]);
            oscillators[i].set_period_ms(period_ms[i]);
            oscillators[i].set_phase0_rad(phase_rad[i]);
        }

        let ref_ms = clock.now_ms();
        let end_ms = ref_ms + (period_ms[0] * cycle).round() as u64;

        let mut corrections_deg = [0.0; NUM_SERVOS];
        let mut last_corr_ms: Option<u64> = None;

        loop {
            let now_ms = clock.now_ms();
            if now_ms > end_ms {
                break;
            }

            let correction_due = match last_corr_ms {
                Some(prev_ms) => now_ms.saturating_sub(prev_ms) as f64 > SAMPLE_PERIOD_MS,
                None => true,
            };
            if correction_due {
                corrections_deg = sample_corrections(balance_controller, *balance_enabled);
                last_corr_ms = Some(now_ms);
            }

            for i in 0..NUM_SERVOS {
                oscillators[i].refresh(driver, now_ms, corrections_deg[i])?;
            }

            clock.wait_until_ms(now_ms + 1);
        }

        Ok(())
    }

    /// Run a gait pattern for `steps` cycles.
    ///
    /// Pattern offsets are combined with the stand offsets so the oscillation
    /// is centred on the standing posture. Fractional steps run a partial
    /// final cycle.
    pub fn execute(&mut self, pattern: &GaitPattern, steps: f64) -> Result<(), GaitError> {
        let mut phase_rad = [0.0; NUM_SERVOS];
        let mut offset_deg = [0.0; NUM_SERVOS];
        for i in 0..NUM_SERVOS {
            phase_rad[i] = pattern.phase_deg[i].to_radians();
            offset_deg[i] = pattern.offset_deg[i] + self.stand_offsets_deg[i];
        }

        self.attach_all()?;
        self.resting = false;

        let cycles = steps.trunc();
        let mut done = 0.0;
        while done < cycles {
            self.oscillate(
                &pattern.amplitude_deg,
                &offset_deg,
                &pattern.period_ms,
                &phase_rad,
                1.0,
            )?;
            done += 1.0;
        }

        self.oscillate(
            &pattern.amplitude_deg,
            &offset_deg,
            &pattern.period_ms,
            &phase_rad,
            steps - cycles,
        )
    }

    // ---- POSES ----

    /// Move to the mechanical neutral pose (all servos at 90 degrees).
    pub fn home(&mut self) -> Result<(), GaitError> {
        self.move_servos_to(STAND_DURATION_MS, [CENTRE_ANGLE_DEG; NUM_SERVOS])?;
        self.resting = true;
        Ok(())
    }

    /// Move to the standing pose.
    pub fn stand(&mut self, duration_ms: u64) -> Result<(), GaitError> {
        self.move_servos_to(duration_ms, self.stand_pose_deg)?;
        self.resting = true;
        Ok(())
    }

    /// Staged power-on sequence: neutral, then hips, then knees, ending in
    /// the standing pose. Avoids the jerk of a single large move on boot.
    pub fn startup(&mut self, stage_duration_ms: u64) -> Result<(), GaitError> {
        info!("Startup: neutral pose");
        self.move_servos_to(stage_duration_ms, [CENTRE_ANGLE_DEG; NUM_SERVOS])?;
        self.settle(STARTUP_SETTLE_MS);

        info!("Startup: hips");
        let sp = self.stand_pose_deg;
        let hips_ready = [
            sp[0],
            sp[1],
            CENTRE_ANGLE_DEG,
            CENTRE_ANGLE_DEG,
            sp[4],
            sp[5],
            CENTRE_ANGLE_DEG,
            CENTRE_ANGLE_DEG,
        ];
        self.move_servos_to(stage_duration_ms, hips_ready)?;
        self.settle(STARTUP_SETTLE_MS);

        info!("Startup: knees");
        self.move_servos_to(stage_duration_ms, self.stand_pose_deg)?;

        info!("Startup complete, robot standing");
        self.resting = true;
        Ok(())
    }

    /// Hold the standing pose under active balance correction for
    /// `duration_ms`. Falls back to a plain stand when no controller is
    /// fitted. The balance-enable flag is restored to its prior state
    /// afterwards.
    pub fn balanced_stand(
        &mut self,
        duration_ms: u64,
        update_period_ms: u64,
    ) -> Result<(), GaitError> {
        if self.balance_controller.is_none() {
            warn!("No balance controller fitted, standing without correction");
            return self.stand(STAND_DURATION_MS);
        }

        self.move_servos_to(STAND_DURATION_MS, self.stand_pose_deg)?;

        let was_enabled = self.balance_enabled;
        self.enable_balance();

        info!("Balanced stand active");

        let start_ms = self.clock.now_ms();
        let mut last_report_ms = start_ms;

        let GaitEngine {
            oscillators,
            driver,
            clock,
            balance_controller,
            stand_pose_deg,
            ..
        } = self;

        if let Some(controller) = balance_controller.as_mut() {
            while clock.now_ms().saturating_sub(start_ms) < duration_ms {
                let corrections_deg = controller.update();

                for i in 0..NUM_SERVOS {
                    oscillators[i]
                        .set_position(driver, stand_pose_deg[i] + corrections_deg[i])?;
                }

                let now_ms = clock.now_ms();
                if now_ms.saturating_sub(last_report_ms) >= 500 {
                    let (roll_deg, pitch_deg) = controller.angles();
                    if roll_deg.abs() > 2.0 || pitch_deg.abs() > 2.0 {
                        debug!(
                            "Balance: roll {:+.1} deg, pitch {:+.1} deg",
                            roll_deg, pitch_deg
                        );
                    }
                    last_report_ms = now_ms;
                }

                clock.wait_until_ms(now_ms + update_period_ms);
            }
        }

        if !was_enabled {
            self.disable_balance();
        }

        self.resting = true;
        info!("Balanced stand complete");
        Ok(())
    }

    // ---- GAITS ----

    /// Walk forwards. Fails without moving when an obstacle is in range.
    pub fn forward(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.check_obstacle()?;
        self.execute(&patterns::forward(period_ms), steps)
    }

    /// Walk backwards. Fails without moving when an obstacle is in range.
    pub fn backward(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.check_obstacle()?;
        self.execute(&patterns::backward(period_ms), steps)
    }

    /// Turn on the spot to the left.
    pub fn turn_left(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::turn_left(period_ms), steps)
    }

    /// Turn on the spot to the right.
    pub fn turn_right(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::turn_right(period_ms), steps)
    }

    /// Dance in place.
    pub fn dance(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::dance(period_ms), steps)
    }

    /// Rock the body forwards and backwards.
    pub fn front_back(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::front_back(period_ms), steps)
    }

    /// Moonwalk shuffle to the left.
    pub fn moonwalk_left(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::moonwalk_left(period_ms), steps)
    }

    /// Bob the body up and down.
    pub fn up_down(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::up_down(period_ms), steps)
    }

    /// Push-ups on the front legs.
    pub fn push_up(&mut self, steps: f64, period_ms: f64) -> Result<(), GaitError> {
        self.execute(&patterns::push_up(period_ms), steps)
    }

    /// Trot with diagonal leg pairs. The forward direction fails without
    /// moving when an obstacle is in range.
    pub fn trot(&mut self, steps: f64, period_ms: f64, reverse: bool) -> Result<(), GaitError> {
        if !reverse {
            self.check_obstacle()?;
        }
        self.execute(&patterns::trot(period_ms, reverse), steps)
    }

    /// Wave a front paw.
    pub fn hello(&mut self) -> Result<(), GaitError> {
        let sp = self.stand_pose_deg;
        let (lift, wave, lean, curl) = (50.0, 30.0, 20.0, 70.0);

        let raised = [
            sp[0] - lift,
            sp[1],
            sp[2] + lean,
            sp[3] - lean,
            sp[4] + lean,
            sp[5] - lean,
            sp[6] - curl,
            sp[7] + curl,
        ];
        let wave_up = [
            sp[0] - lift,
            sp[1] + wave,
            sp[2] + lean,
            sp[3] + curl,
            sp[4] + lean,
            sp[5] - lean,
            sp[6] - curl,
            sp[7] + curl,
        ];
        let mut wave_down = wave_up;
        wave_down[1] = sp[1] - wave;

        self.move_servos_to(300, raised)?;

        for _ in 0..3 {
            self.move_servos_to(200, wave_up)?;
            self.move_servos_to(200, wave_down)?;
        }

        self.settle(300);
        self.move_servos_to(300, self.stand_pose_deg)
    }

    /// Rotate slowly on the spot in quarter turns, ending in the standing
    /// pose. Used to point the range sensor around the room.
    pub fn scan(&mut self, rotations: u32) -> Result<(), GaitError> {
        let turns_per_rotation = 4;

        for _ in 0..turns_per_rotation * rotations {
            self.turn_right(1.0, SCAN_TURN_PERIOD_MS)?;
        }

        self.stand(STAND_DURATION_MS)
    }

    // ---- OBSTACLE SENSING ----

    /// Latest range reading, or -1 when no sensor is fitted.
    ///
    /// Units: centimeters
    pub fn distance_cm(&mut self) -> f64 {
        match self.range_sensor.as_mut() {
            Some(sensor) => sensor.distance_cm(),
            None => -1.0,
        }
    }

    // ---- BALANCE ----

    /// Enable balance corrections.
    pub fn enable_balance(&mut self) {
        self.balance_enabled = true;
        if let Some(controller) = self.balance_controller.as_mut() {
            controller.enable();
        }
    }

    /// Disable balance corrections.
    pub fn disable_balance(&mut self) {
        self.balance_enabled = false;
        if let Some(controller) = self.balance_controller.as_mut() {
            controller.disable();
        }
    }

    /// True when corrections are enabled and a controller is fitted.
    pub fn is_balance_enabled(&self) -> bool {
        self.balance_enabled && self.balance_controller.is_some()
    }

    /// Whether a balance controller is fitted at all.
    pub fn has_balance_controller(&self) -> bool {
        self.balance_controller.is_some()
    }

    /// Calibrate the fitted controller's gyro bias. The robot must be still.
    pub fn calibrate_balance(&mut self) {
        match self.balance_controller.as_mut() {
            Some(controller) => controller.calibrate(),
            None => warn!("No balance controller fitted, nothing to calibrate"),
        }
    }

    /// Current `(roll, pitch)` attitude in degrees, `(0, 0)` without a
    /// controller.
    pub fn balance_angles(&mut self) -> (f64, f64) {
        match self.balance_controller.as_mut() {
            Some(controller) => controller.angles(),
            None => (0.0, 0.0),
        }
    }

    /// Whether the attitude exceeds the tilt threshold.
    pub fn is_tilted(&mut self, threshold_deg: f64) -> bool {
        match self.balance_controller.as_mut() {
            Some(controller) => controller.is_tilted(threshold_deg),
            None => false,
        }
    }

    /// Whether the robot has fallen over.
    pub fn is_fallen(&mut self, threshold_deg: f64) -> bool {
        match self.balance_controller.as_mut() {
            Some(controller) => controller.is_fallen(threshold_deg),
            None => false,
        }
    }

    /// True when the robot is parked in a stable pose.
    pub fn is_resting(&self) -> bool {
        self.resting
    }

    /// Time on the motion clock.
    ///
    /// Units: milliseconds
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Block for `duration_ms` without commanding the servos.
    pub fn settle(&self, duration_ms: u64) {
        let deadline_ms = self.clock.now_ms() + duration_ms;
        self.clock.wait_until_ms(deadline_ms);
    }

    // ---- PRIVATE ----

    fn attach_all(&mut self) -> Result<(), GaitError> {
        let GaitEngine {
            oscillators,
            driver,
            reversed,
            ..
        } = self;

        for i in 0..NUM_SERVOS {
            oscillators[i].attach(driver, reversed[i])?;
        }
        Ok(())
    }

    fn check_obstacle(&mut self) -> Result<(), GaitError> {
        if let Some(sensor) = self.range_sensor.as_mut() {
            let distance_cm = sensor.distance_cm();
            if 0.0 < distance_cm && distance_cm < self.obstacle_threshold_cm {
                warn!("Obstacle {:.1} cm ahead, refusing to move", distance_cm);
                return Err(GaitError::ObstacleDetected { distance_cm });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn sample_corrections(
    controller: &mut Option<Box<dyn BalanceController>>,
    enabled: bool,
) -> [f64; NUM_SERVOS] {
    match controller {
        Some(controller) if enabled => controller.update(),
        _ => [0.0; NUM_SERVOS],
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
