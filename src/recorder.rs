// Open-loop step experiment
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

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::identify::StepResponse;
use crate::interfaces::{CommandSink, HistoryService};
use crate::time::{Clock, InstantLike};
use crate::tuning::TuningError;

/// Longest uninterrupted wait; cancellation and timeout are checked at least this often
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Shared flag asking a running experiment or control loop to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Where the experiment sends its outputs and which series it reads back
#[derive(Debug, Clone, Copy)]
pub struct ExperimentTarget<'a> {
    /// Actuator id
    pub actuator: &'a str,
    /// Command name
    pub command: &'a str,
    /// History series of the process variable
    pub series: &'a str,
}

/// An open-loop step experiment: hold `base_output` for `stable_time`, then hold
/// `base_output + step` for `stable_time`, then fetch the recorded response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepExperiment {
    /// Output applied while the process settles
    pub base_output: f64,
    /// Output step
    pub step: f64,
    /// Settling time of each phase
    pub stable_time: Duration,
    /// Upper bound on the whole experiment
    pub timeout: Option<Duration>,
}

impl StepExperiment {
    /// Output applied during the second phase, and left applied afterwards
    pub fn final_output(&self) -> f64 {
        self.base_output + self.step
    }

    /// Runs the experiment and returns the cleaned response.
    ///
    /// The stepped output stays applied when this returns, whether or not it succeeded.
    pub fn record<K: Clock>(
        &self,
        clock: &K,
        target: ExperimentTarget<'_>,
        sink: &mut dyn CommandSink,
        history: &mut dyn HistoryService<K::Instant>,
        cancel: &CancelToken,
    ) -> Result<StepResponse, TuningError> {
        if self.step == 0.0 || !self.step.is_finite() {
            return Err(TuningError::InvalidStep);
        }

        let started = clock.now();

        info!(output = self.base_output, "step experiment: settling at base output");
        sink.write(target.actuator, target.command, self.base_output)?;
        self.hold(clock, started, cancel)?;

        info!(output = self.final_output(), "step experiment: applying step");
        sink.write(target.actuator, target.command, self.final_output())?;
        self.hold(clock, started, cancel)?;

        let finished = clock.now();
        let samples = history.query(target.series, started, finished)?;
        self.check_timeout(clock, started)?;
        debug!(count = samples.len(), "step experiment: received samples");

        StepResponse::from_samples(samples)
    }

    fn hold<K: Clock>(
        &self,
        clock: &K,
        started: K::Instant,
        cancel: &CancelToken,
    ) -> Result<(), TuningError> {
        let phase_start = clock.now();
        loop {
            if cancel.is_cancelled() {
                return Err(TuningError::Cancelled);
            }
            self.check_timeout(clock, started)?;

            let elapsed = clock.now().duration_since(phase_start);
            if elapsed >= self.stable_time {
                return Ok(());
            }
            clock.sleep((self.stable_time - elapsed).min(WAIT_SLICE));
        }
    }

    fn check_timeout<K: Clock>(&self, clock: &K, started: K::Instant) -> Result<(), TuningError> {
        match self.timeout {
            Some(timeout) if clock.now().duration_since(started) > timeout => {
                Err(TuningError::TimedOut(timeout))
            }
            _ => Ok(()),
        }
    }
}
