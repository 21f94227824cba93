//! General time utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        None
    }
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of monotonic milliseconds with the ability to pause until a
/// deadline.
///
/// Motion code is written against this trait rather than against `Instant`
/// directly, so that servo timing can be driven deterministically without
/// real sleeps.
pub trait Clock {
    /// Milliseconds elapsed since the clock's reference point.
    fn now_ms(&self) -> u64;

    /// Pause execution until the given deadline in the clock's own timebase.
    ///
    /// Returns immediately if the deadline has already passed.
    fn wait_until_ms(&self, deadline_ms: u64);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Monotonic wall clock backed by [`std::time::Instant`].
pub struct MonoClock {
    epoch: Instant,
}

/// Simulated clock for tests and dry runs.
///
/// Waiting jumps the clock forward to the deadline, so code which sleeps
/// between servo updates runs instantly. Clones share the same underlying
/// time value, allowing the creator to advance or inspect the clock after
/// handing a copy over.
#[derive(Clone)]
pub struct SimClock {
    now_ms: Rc<Cell<u64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MonoClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonoClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonoClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn wait_until_ms(&self, deadline_ms: u64) {
        if let Some(remaining) = deadline_ms.checked_sub(self.now_ms()) {
            std::thread::sleep(Duration::from_millis(remaining));
        }
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now_ms: Rc::new(Cell::new(0)),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn wait_until_ms(&self, deadline_ms: u64) {
        if deadline_ms > self.now_ms.get() {
            self.now_ms.set(deadline_ms);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_clock() {
        let clock = SimClock::new();
        assert_eq!(clock.now_ms(), 0);

        clock.advance_ms(100);
        assert_eq!(clock.now_ms(), 100);

        // Waiting jumps forward, but never backwards
        clock.wait_until_ms(250);
        assert_eq!(clock.now_ms(), 250);
        clock.wait_until_ms(10);
        assert_eq!(clock.now_ms(), 250);

        // Clones share the same time value
        let other = clock.clone();
        other.advance_ms(50);
        assert_eq!(clock.now_ms(), 300);
    }

    #[test]
    fn test_duration_to_seconds() {
        let dur = chrono::Duration::milliseconds(1500);
        assert_eq!(duration_to_seconds(dur), Some(1.5));
    }
}
