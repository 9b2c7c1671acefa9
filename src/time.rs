// Timestamp types and the sample clock driving the control loop
// Copyright © 2025 Hs293Go
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included
// in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES
// OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.
// IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT,
// TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE
// OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use core::fmt::Debug;
use core::ops::Add;
use core::time::Duration;
use std::sync::Arc;

use parking_lot::Mutex;

/// A trait for time-like objects that can be used to measure elapsed time.
///
/// The PID engine derives its integration interval from the difference of two instants when no
/// fixed interval is configured. An instant that lies *before* `earlier` must yield
/// `Duration::ZERO`, which the engine treats as a repeated evaluation.
pub trait InstantLike: Sized + Add<Duration, Output = Self> + Clone + Copy + Debug + Send + Sync {
    /// Returns the amount of time elapsed from another instant to this one, saturating at zero
    #[must_use]
    fn duration_since(&self, earlier: Self) -> Duration;
}

/// A wrapper around an unsigned 64-bit integer representing milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Millis(pub u64);

impl InstantLike for Millis {
    fn duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Millis {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Millis(self.0 + rhs.as_millis() as u64)
    }
}

/// Seconds since an arbitrary epoch. This is the timestamp type of simulated time and of the
/// sample series returned by history services.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeF64(pub f64);

impl InstantLike for TimeF64 {
    fn duration_since(&self, earlier: Self) -> Duration {
        let secs = self.0 - earlier.0;
        if secs > 0.0 && secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO // saturate
        }
    }
}

impl Add<Duration> for TimeF64 {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        TimeF64(self.0 + rhs.as_secs_f64())
    }
}

impl TimeF64 {
    /// Constructs a new TimeF64 from raw seconds.
    pub fn from_secs(secs: f64) -> Self {
        TimeF64(secs)
    }

    /// Returns the underlying seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }
}

/// A convenient wrapper around `std::time::Instant` satisfying the `InstantLike` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StdInstant(pub std::time::Instant);

impl StdInstant {
    /// Captures the current instant
    pub fn now() -> Self {
        StdInstant(std::time::Instant::now())
    }
}

impl InstantLike for StdInstant {
    fn duration_since(&self, other: Self) -> Duration {
        self.0.saturating_duration_since(other.0)
    }
}

impl Add<Duration> for StdInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        StdInstant(self.0 + rhs)
    }
}

/// The sample clock of a control loop: tells the time and waits.
///
/// The driver never calls `std::thread::sleep` directly so that the same loop runs against wall
/// time in production and against simulated time in tests.
pub trait Clock {
    /// Timestamp type handed to the control law and the history service
    type Instant: InstantLike;

    /// Returns the current instant
    fn now(&self) -> Self::Instant;

    /// Blocks (or advances simulated time) for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time::Instant` and `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = StdInstant;

    fn now(&self) -> StdInstant {
        StdInstant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A manually advanced clock. Sleeping advances time instantly, so a loop running for hours of
/// simulated time finishes in milliseconds.
///
/// Clones share the same time base, so a simulated plant holding a clone observes every advance
/// made by the driver.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: Arc<Mutex<TimeF64>>,
}

impl SimulatedClock {
    /// Creates a clock starting at `start`
    pub fn new(start: TimeF64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves time forward without going through `sleep`
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now = *now + duration;
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(TimeF64(0.0))
    }
}

impl Clock for SimulatedClock {
    type Instant = TimeF64;

    fn now(&self) -> TimeF64 {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that StdInstant is just one constructor call away from std::time::Instant
    /// and calling duration_since is equivalent to calling the same method on the underlying Instant.
    #[test]
    fn test_std_instant_wrapper() {
        let start = StdInstant::now();
        let end = StdInstant(std::time::Instant::now());
        let result = end.duration_since(start);
        let expected = end.0.duration_since(start.0);
        assert_eq!(result, expected);
    }

    #[test]
    fn test_backwards_instants_saturate() {
        assert_eq!(Millis(5).duration_since(Millis(10)), Duration::ZERO);
        assert_eq!(TimeF64(1.0).duration_since(TimeF64(2.0)), Duration::ZERO);
        assert_eq!(
            TimeF64(2.5).duration_since(TimeF64(2.0)),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_system_clock_sleeps() {
        let clock = SystemClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now().duration_since(start) >= Duration::from_millis(2));
    }

    #[test]
    fn test_simulated_clock_clones_share_time() {
        let clock = SimulatedClock::default();
        let observer = clock.clone();
        clock.sleep(Duration::from_secs(3));
        assert_eq!(observer.now(), TimeF64(3.0));
    }
}
