//! # Range and temperature sensing
//!
//! Trait seams for the robot's two environment sensors, with simulation
//! implementations for bench use and hardware drivers compiled in for the
//! Pi target.
//!
//! Range readings use a -1 sentinel for "no echo", which propagates all the
//! way out to the telemetry stream. Temperature readings carry a calibration
//! offset because the CPU die runs well above ambient.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::Cell;
use std::rc::Rc;

#[cfg(target_arch = "arm")]
use std::time::{Duration, Instant};

#[cfg(target_arch = "arm")]
use log::warn;

#[cfg(target_arch = "arm")]
use rppal::gpio::{Gpio, InputPin, OutputPin};

#[cfg(target_arch = "arm")]
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest echo wait before a range measurement is abandoned.
///
/// Units: microseconds
#[cfg(target_arch = "arm")]
const ECHO_TIMEOUT_US: u64 = 30_000;

/// Speed of sound used to convert echo time to distance.
///
/// Units: centimeters per microsecond
#[cfg(target_arch = "arm")]
const SOUND_SPEED_CM_PER_US: f64 = 0.0343;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A distance sensor pointing out of the front of the robot.
pub trait RangeSensor {
    /// Latest distance reading, or -1 when no echo was received.
    ///
    /// Units: centimeters
    fn distance_cm(&mut self) -> f64;
}

/// A temperature probe for thermal monitoring.
pub trait TempSensor {
    /// Latest temperature reading.
    ///
    /// Units: degrees Celsius
    fn temperature_c(&mut self) -> f64;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur bringing up a hardware sensor.
#[cfg(target_arch = "arm")]
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

// ---------------------------------------------------------------------------
// SIMULATION SENSORS
// ---------------------------------------------------------------------------

/// Settable range sensor for runs without hardware. Clones share the same
/// reading, so a handle kept outside the engine can steer it.
#[derive(Clone)]
pub struct SimRange {
    distance_cm: Rc<Cell<f64>>,
}

/// Settable temperature sensor for runs without hardware.
#[derive(Clone)]
pub struct SimTemp {
    temperature_c: Rc<Cell<f64>>,
}

impl SimRange {
    pub fn new(distance_cm: f64) -> Self {
        Self {
            distance_cm: Rc::new(Cell::new(distance_cm)),
        }
    }

    /// Change the reading seen by all clones.
    pub fn set_distance_cm(&self, distance_cm: f64) {
        self.distance_cm.set(distance_cm);
    }
}

impl RangeSensor for SimRange {
    fn distance_cm(&mut self) -> f64 {
        self.distance_cm.get()
    }
}

impl SimTemp {
    pub fn new(temperature_c: f64) -> Self {
        Self {
            temperature_c: Rc::new(Cell::new(temperature_c)),
        }
    }

    /// Change the reading seen by all clones.
    pub fn set_temperature_c(&self, temperature_c: f64) {
        self.temperature_c.set(temperature_c);
    }
}

impl TempSensor for SimTemp {
    fn temperature_c(&mut self) -> f64 {
        self.temperature_c.get()
    }
}

// ---------------------------------------------------------------------------
// HARDWARE SENSORS
// ---------------------------------------------------------------------------

/// HC-SR04 ultrasonic range sensor on a trigger/echo GPIO pair.
#[cfg(target_arch = "arm")]
pub struct Hcsr04 {
    trigger: OutputPin,
    echo: InputPin,
    timeout: Duration,
}

#[cfg(target_arch = "arm")]
impl Hcsr04 {
    pub fn new(trigger_pin: u8, echo_pin: u8) -> Result<Self, SensorError> {
        let gpio = Gpio::new()?;
        let mut trigger = gpio.get(trigger_pin)?.into_output();
        let echo = gpio.get(echo_pin)?.into_input();

        trigger.set_low();

        Ok(Self {
            trigger,
            echo,
            timeout: Duration::from_micros(ECHO_TIMEOUT_US),
        })
    }
}

#[cfg(target_arch = "arm")]
impl RangeSensor for Hcsr04 {
    fn distance_cm(&mut self) -> f64 {
        // 10 us trigger pulse starts the measurement
        self.trigger.set_low();
        spin_wait(Duration::from_micros(2));
        self.trigger.set_high();
        spin_wait(Duration::from_micros(10));
        self.trigger.set_low();

        // Wait for the echo to start
        let wait_start = Instant::now();
        while self.echo.is_low() {
            if wait_start.elapsed() > self.timeout {
                return -1.0;
            }
        }

        // Measure how long the echo stays high
        let pulse_start = Instant::now();
        while self.echo.is_high() {
            if pulse_start.elapsed() > self.timeout {
                return -1.0;
            }
        }

        let pulse_us = pulse_start.elapsed().as_micros() as f64;

        // Sound makes the round trip, so halve the distance
        (pulse_us * SOUND_SPEED_CM_PER_US) / 2.0
    }
}

/// CPU die thermometer read from the kernel thermal zone, with a calibration
/// offset to approximate ambient.
#[cfg(target_arch = "arm")]
pub struct CpuThermo {
    offset_c: f64,
}

#[cfg(target_arch = "arm")]
impl CpuThermo {
    pub fn new(offset_c: f64) -> Self {
        Self { offset_c }
    }
}

#[cfg(target_arch = "arm")]
impl TempSensor for CpuThermo {
    fn temperature_c(&mut self) -> f64 {
        let raw = match std::fs::read_to_string("/sys/class/thermal/thermal_zone0/temp") {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not read thermal zone: {}", e);
                return 0.0;
            }
        };

        match raw.trim().parse::<f64>() {
            Ok(milli_c) => milli_c / 1000.0 + self.offset_c,
            Err(_) => {
                warn!("Unparseable thermal zone reading: {:?}", raw.trim());
                0.0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

// thread::sleep is far too coarse at microsecond scale
#[cfg(target_arch = "arm")]
fn spin_wait(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {}
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_sensors_share_state() {
        let mut range = SimRange::new(50.0);
        let range_handle = range.clone();

        assert!((range.distance_cm() - 50.0).abs() < 1e-9);

        range_handle.set_distance_cm(5.0);
        assert!((range.distance_cm() - 5.0).abs() < 1e-9);

        let mut temp = SimTemp::new(21.5);
        let temp_handle = temp.clone();

        temp_handle.set_temperature_c(30.0);
        assert!((temp.temperature_c() - 30.0).abs() < 1e-9);
    }
}
