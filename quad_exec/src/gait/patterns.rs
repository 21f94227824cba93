//! # Gait parameter tables
//!
//! A [`GaitPattern`] is the full oscillator parameter set for one move: per
//! servo amplitude, offset, period and initial phase. The tables here encode
//! the tuned gaits for the eight servo layout, in the engine's canonical
//! order:
//!
//! | Index | Servo | Index | Servo |
//! |-------|-------|-------|-------|
//! | 0 | front right hip | 4 | back right hip |
//! | 1 | front left hip | 5 | back left hip |
//! | 2 | front right leg | 6 | back right leg |
//! | 3 | front left leg | 7 | back left leg |
//!
//! Offsets are degrees about the stand pose, phases are degrees.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::gait::NUM_SERVOS;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Oscillator parameter set for a single gait.
#[derive(Clone, Debug, PartialEq)]
pub struct GaitPattern {
    /// Oscillation amplitude per servo.
    ///
    /// Units: degrees
    pub amplitude_deg: [f64; NUM_SERVOS],

    /// Oscillation offset per servo, about the stand pose.
    ///
    /// Units: degrees
    pub offset_deg: [f64; NUM_SERVOS],

    /// Oscillation period per servo.
    ///
    /// Units: milliseconds
    pub period_ms: [f64; NUM_SERVOS],

    /// Initial phase per servo.
    ///
    /// Units: degrees
    pub phase_deg: [f64; NUM_SERVOS],
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Walking gait, front legs leading.
pub fn forward(period_ms: f64) -> GaitPattern {
    let x_amp = 15.0;
    let z_amp = 15.0;
    let ap = 10.0;
    let hi = 15.0;
    let front_x = 6.0;

    // One leg runs with extra throw and a dropped centre, tuned to stop it scuffing
    let lift_amp = 20.0;
    let lift_offset = -10.0;

    GaitPattern {
        amplitude_deg: [x_amp, x_amp, lift_amp, z_amp, x_amp, x_amp, z_amp, z_amp],
        offset_deg: [
            ap - front_x,
            -ap + front_x,
            lift_offset,
            hi,
            -ap - front_x,
            ap + front_x,
            hi,
            -hi,
        ],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [180.0, 180.0, 90.0, 90.0, 0.0, 0.0, 90.0, 90.0],
    }
}

/// Walking gait reversed, back legs leading.
pub fn backward(period_ms: f64) -> GaitPattern {
    let mut pattern = forward(period_ms);
    pattern.phase_deg = [0.0, 0.0, 90.0, 90.0, 180.0, 180.0, 90.0, 90.0];
    pattern
}

/// Turn on the spot to the left.
pub fn turn_left(period_ms: f64) -> GaitPattern {
    let mut pattern = turn_right(period_ms);
    pattern.phase_deg = [0.0, 180.0, 90.0, 90.0, 180.0, 0.0, 90.0, 90.0];
    pattern
}

/// Turn on the spot to the right.
pub fn turn_right(period_ms: f64) -> GaitPattern {
    let x_amp = 15.0;
    let z_amp = 15.0;
    let ap = 5.0;
    let hi = 23.0;

    GaitPattern {
        amplitude_deg: [x_amp, x_amp, z_amp, z_amp, x_amp, x_amp, z_amp, z_amp],
        offset_deg: [ap, -ap, -hi, hi, -ap, ap, hi, -hi],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [180.0, 0.0, 90.0, 90.0, 0.0, 180.0, 90.0, 90.0],
    }
}

/// Leg-only dance move, hips held still.
pub fn dance(period_ms: f64) -> GaitPattern {
    let z_amp = 30.0;
    let hi = 20.0;

    GaitPattern {
        amplitude_deg: [0.0, 0.0, z_amp, z_amp, 0.0, 0.0, z_amp, z_amp],
        offset_deg: [0.0, 0.0, -hi, hi, 0.0, 0.0, hi, -hi],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [0.0, 0.0, 0.0, 270.0, 0.0, 0.0, 90.0, 180.0],
    }
}

/// Rock the body forwards and backwards.
pub fn front_back(period_ms: f64) -> GaitPattern {
    let x_amp = 30.0;
    let z_amp = 20.0;
    let ap = 15.0;
    let hi = 30.0;

    GaitPattern {
        amplitude_deg: [x_amp, x_amp, z_amp, z_amp, x_amp, x_amp, z_amp, z_amp],
        offset_deg: [ap, -ap, -hi, hi, -ap, ap, hi, -hi],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [0.0, 180.0, 270.0, 90.0, 0.0, 180.0, 90.0, 270.0],
    }
}

/// Moonwalk shuffle to the left, legs only.
pub fn moonwalk_left(period_ms: f64) -> GaitPattern {
    let z_amp = 25.0;
    let o = 5.0;

    GaitPattern {
        amplitude_deg: [0.0, 0.0, z_amp, z_amp, 0.0, 0.0, z_amp, z_amp],
        offset_deg: [
            0.0,
            0.0,
            -z_amp - o,
            z_amp + o,
            0.0,
            0.0,
            z_amp + o,
            -z_amp - o,
        ],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [0.0, 0.0, 0.0, 80.0, 0.0, 0.0, 160.0, 290.0],
    }
}

/// Bob the body up and down.
pub fn up_down(period_ms: f64) -> GaitPattern {
    let z_amp = 35.0;
    let ap = 10.0;
    let hi = 15.0;

    GaitPattern {
        amplitude_deg: [0.0, 0.0, z_amp, z_amp, 0.0, 0.0, z_amp, z_amp],
        offset_deg: [ap, -ap, -hi, hi, -ap, ap, hi, -hi],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [0.0, 0.0, 90.0, 270.0, 180.0, 180.0, 270.0, 90.0],
    }
}

/// Push-ups on the front legs, back legs braced.
pub fn push_up(period_ms: f64) -> GaitPattern {
    let z_amp = 40.0;
    let x_amp = 45.0;
    let b = 35.0;

    GaitPattern {
        amplitude_deg: [0.0, 0.0, z_amp, z_amp, 0.0, 0.0, 0.0, 0.0],
        offset_deg: [0.0, 0.0, 0.0, 0.0, x_amp, -x_amp, b, -b],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg: [0.0, 0.0, 90.0, -90.0, 0.0, 0.0, 0.0, 0.0],
    }
}

/// Trot gait: diagonal leg pairs (front left with back right, front right
/// with back left) move together, 180 degrees apart from the other pair.
pub fn trot(period_ms: f64, reverse: bool) -> GaitPattern {
    let hip_amp = 18.0;
    let leg_amp = 20.0;
    let body_tilt = 12.0;

    let phase_deg = if reverse {
        [180.0, 0.0, 270.0, 90.0, 0.0, 180.0, 90.0, 270.0]
    } else {
        [0.0, 180.0, 90.0, 270.0, 180.0, 0.0, 270.0, 90.0]
    };

    GaitPattern {
        amplitude_deg: [
            hip_amp, hip_amp, leg_amp, leg_amp, hip_amp, hip_amp, leg_amp, leg_amp,
        ],
        offset_deg: [
            0.0, 0.0, -body_tilt, body_tilt, 0.0, 0.0, body_tilt, -body_tilt,
        ],
        period_ms: [period_ms; NUM_SERVOS],
        phase_deg,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
