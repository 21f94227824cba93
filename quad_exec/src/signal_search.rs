//! # Signal search
//!
//! Implements the `spm_far_from_home` routine: locate the master's radio by
//! signal strength and walk towards it.
//!
//! The robot samples RSSI over a full rotation in 30 degree steps, averaging
//! several readings per heading. The strongest heading wins, the robot turns
//! to face it, then approaches in short forward bursts which stop early at an
//! obstacle. A log-distance path loss model turns the winning RSSI into a
//! rough range estimate for the final report.
//!
//! The search owns the robot while it runs: commands arriving on the link
//! during sampling are logged and dropped, never queued.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde_json::{json, Value};
use thiserror::Error;

// Internal
use crate::gait::{GaitEngine, GaitError, STAND_DURATION_MS};
use crate::servo_ctrl::ServoDriver;
use radio_if::handler::ProtocolHandler;
use radio_if::msg::InboundEvent;
use radio_if::net::RadioLink;
use util::time::Clock;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of headings sampled over one full rotation.
const SCAN_STEPS: usize = 12;

/// Angular distance between sampled headings.
///
/// Units: degrees
const HEADING_STEP_DEG: f64 = 30.0;

/// RSSI readings averaged per heading.
const RSSI_SAMPLES: usize = 5;

/// Wait for a single RSSI-bearing datagram.
///
/// Units: milliseconds
const SAMPLE_TIMEOUT_MS: u64 = 50;

/// Pause between RSSI samples at one heading.
///
/// Units: milliseconds
const SAMPLE_GAP_MS: u64 = 20;

/// Period of one scanning or facing turn.
///
/// Units: milliseconds
const TURN_PERIOD_MS: f64 = 1500.0;

/// Settle time after each turn, letting the chassis stop swaying before the
/// next sample.
///
/// Units: milliseconds
const TURN_SETTLE_MS: u64 = 250;

/// Maximum forward bursts in the approach phase.
const FORWARD_BURSTS: usize = 4;

/// Period of one approach burst.
///
/// Units: milliseconds
const BURST_PERIOD_MS: f64 = 900.0;

/// Pause between approach bursts.
///
/// Units: milliseconds
const BURST_GAP_MS: u64 = 200;

/// Expected RSSI at one metre from the transmitter.
///
/// Units: dBm
const PATH_LOSS_RSSI_1M_DBM: f64 = -59.0;

/// Path loss exponent for an indoor environment.
const PATH_LOSS_EXPONENT: f64 = 2.7;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the signal search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No signal strength readings received during the scan")]
    NoSignal,

    #[error(transparent)]
    Gait(#[from] GaitError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Run the full search: scan, face the strongest heading, approach.
///
/// On success the returned value is the structured result for the command
/// response, including the winning heading and the estimated range.
pub fn run<D: ServoDriver, C: Clock, L: RadioLink>(
    engine: &mut GaitEngine<D, C>,
    handler: &mut ProtocolHandler<L>,
) -> Result<Value, SearchError> {
    info!("Signal search: sampling RSSI over {} headings", SCAN_STEPS);

    let mut readings: Vec<(f64, Option<f64>)> = Vec::with_capacity(SCAN_STEPS);

    for step in 0..SCAN_STEPS {
        let heading_deg = step as f64 * HEADING_STEP_DEG;
        let rssi_dbm = sample_heading(engine, handler);

        match rssi_dbm {
            Some(rssi_dbm) => debug!("Heading {:3.0} deg: {:.1} dBm", heading_deg, rssi_dbm),
            None => debug!("Heading {:3.0} deg: no readings", heading_deg),
        }
        readings.push((heading_deg, rssi_dbm));

        engine.turn_right(1.0, TURN_PERIOD_MS)?;
        engine.settle(TURN_SETTLE_MS);
    }

    let (best_heading_deg, best_rssi_dbm) = readings
        .iter()
        .filter_map(|&(heading_deg, rssi_dbm)| rssi_dbm.map(|r| (heading_deg, r)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(SearchError::NoSignal)?;

    info!(
        "Strongest signal {:.1} dBm at {:.0} deg",
        best_rssi_dbm, best_heading_deg
    );

    // Face the winning heading along the shorter arc
    let turns = turns_to_face(best_heading_deg);
    for _ in 0..turns.abs() {
        if turns < 0 {
            engine.turn_left(1.0, TURN_PERIOD_MS)?;
        } else {
            engine.turn_right(1.0, TURN_PERIOD_MS)?;
        }
        engine.settle(TURN_SETTLE_MS);
    }
    engine.stand(STAND_DURATION_MS)?;

    // Approach in bounded bursts, stopping short of obstacles
    for burst in 0..FORWARD_BURSTS {
        match engine.forward(1.0, BURST_PERIOD_MS) {
            Ok(()) => (),
            Err(GaitError::ObstacleDetected { distance_cm }) => {
                warn!(
                    "Obstacle {:.1} cm ahead after {} of {} bursts, stopping approach",
                    distance_cm, burst, FORWARD_BURSTS
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }

        engine.settle(BURST_GAP_MS);

        // Keep the receive queue drained between bursts
        let _ = poll_rssi(handler, SAMPLE_TIMEOUT_MS);
    }

    engine.stand(STAND_DURATION_MS)?;

    let est_distance_m = estimate_distance_m(best_rssi_dbm);
    info!(
        "Signal search complete, transmitter roughly {:.1} m away",
        est_distance_m
    );

    Ok(json!({
        "status": "spm_completed",
        "heading_deg": best_heading_deg,
        "rssi": (best_rssi_dbm * 10.0).round() / 10.0,
        "est_distance_m": (est_distance_m * 100.0).round() / 100.0,
    }))
}

/// Log-distance path loss range estimate for a received signal strength.
///
/// Units: meters
pub fn estimate_distance_m(rssi_dbm: f64) -> f64 {
    10f64.powf((PATH_LOSS_RSSI_1M_DBM - rssi_dbm) / (10.0 * PATH_LOSS_EXPONENT))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Average several RSSI readings at the current heading, `None` when nothing
/// was heard at all.
fn sample_heading<D: ServoDriver, C: Clock, L: RadioLink>(
    engine: &GaitEngine<D, C>,
    handler: &mut ProtocolHandler<L>,
) -> Option<f64> {
    let mut sum_dbm = 0.0;
    let mut count = 0;

    for _ in 0..RSSI_SAMPLES {
        if let Some(rssi_dbm) = poll_rssi(handler, SAMPLE_TIMEOUT_MS) {
            sum_dbm += rssi_dbm;
            count += 1;
        }

        engine.settle(SAMPLE_GAP_MS);
    }

    if count > 0 {
        Some(sum_dbm / count as f64)
    } else {
        None
    }
}

/// Receive one datagram and extract a signal strength reading from it.
///
/// Structured payloads may carry their own `rssi`/`last_rssi` measurement,
/// which wins over the transport's value. Commands are dropped with a
/// warning, the search is not interruptible.
fn poll_rssi<L: RadioLink>(handler: &mut ProtocolHandler<L>, timeout_ms: u64) -> Option<f64> {
    let event = match handler.receive(timeout_ms) {
        Ok(Some(event)) => event,
        Ok(None) => return None,
        Err(e) => {
            warn!("Receive failed while sampling RSSI: {}", e);
            return None;
        }
    };

    match event {
        InboundEvent::Structured { data, rssi, .. } => data["rssi"]
            .as_i64()
            .or_else(|| data["last_rssi"].as_i64())
            .map(|r| r as f64)
            .or_else(|| rssi.map(f64::from)),
        InboundEvent::Command { cmd, rssi, .. } => {
            warn!("Dropping {} received during signal search", cmd.name());
            rssi.map(f64::from)
        }
        InboundEvent::Unknown { rssi, .. } | InboundEvent::DecodeError { rssi, .. } => {
            rssi.map(f64::from)
        }
    }
}

/// Number of 30 degree turns needed to face `target_deg`, taking the shorter
/// arc. Negative counts turn left.
fn turns_to_face(target_deg: f64) -> i32 {
    let error_deg = target_deg.rem_euclid(360.0);

    if error_deg > 180.0 {
        -(((360.0 - error_deg) / HEADING_STEP_DEG).round() as i32)
    } else {
        (error_deg / HEADING_STEP_DEG).round() as i32
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
