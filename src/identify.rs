// First-order-plus-dead-time identification from an open-loop step response
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

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::tuning::TuningError;

/// Fraction of the total response reached after one time constant
const TIME_CONSTANT_FRACTION: f64 = 0.63;

/// One recorded value of the process variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepResponseSample {
    /// Seconds since an arbitrary epoch
    pub timestamp: f64,
    /// Recorded process value
    pub value: f64,
}

impl StepResponseSample {
    /// Creates a sample
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(f64, f64)> for StepResponseSample {
    fn from((timestamp, value): (f64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// A strictly time-ordered series of at least two samples.
///
/// Samples with a non-finite timestamp or value are dropped. Of several samples sharing a
/// timestamp only the first, in input order, is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResponse {
    samples: Vec<StepResponseSample>,
}

impl StepResponse {
    /// Cleans up a raw series as returned by a history service
    ///
    /// # Returns
    /// - `Err(TuningError::InsufficientData)` if fewer than two distinct timestamps remain.
    pub fn from_samples<S>(samples: impl IntoIterator<Item = S>) -> Result<Self, TuningError>
    where
        S: Into<StepResponseSample>,
    {
        let mut samples: Vec<StepResponseSample> = samples
            .into_iter()
            .map(Into::into)
            .filter(|it| it.timestamp.is_finite() && it.value.is_finite())
            .collect();

        // Stable sort, so the first of several equal timestamps stays in front
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        samples.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);

        if samples.len() < 2 {
            return Err(TuningError::InsufficientData {
                distinct: samples.len(),
            });
        }
        Ok(Self { samples })
    }

    /// The cleaned samples
    pub fn samples(&self) -> &[StepResponseSample] {
        &self.samples
    }

    /// Number of distinct samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; a step response holds at least two samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Backward-difference slopes. The first sample has no predecessor and gets a slope of zero.
    pub fn slopes(&self) -> Vec<f64> {
        core::iter::once(0.0)
            .chain(self.samples.windows(2).map(|w| {
                (w[1].value - w[0].value) / (w[1].timestamp - w[0].timestamp)
            }))
            .collect()
    }

    fn first(&self) -> StepResponseSample {
        self.samples[0]
    }

    fn last(&self) -> StepResponseSample {
        self.samples[self.samples.len() - 1]
    }
}

/// First-order-plus-dead-time model of a process, per unit of input step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessModel {
    static_gain: f64,
    velocity_gain: f64,
    dead_time: f64,
    time_constant: f64,
}

impl ProcessModel {
    /// Creates a model from known parameters
    pub fn new(static_gain: f64, velocity_gain: f64, dead_time: f64, time_constant: f64) -> Self {
        Self {
            static_gain,
            velocity_gain,
            dead_time,
            time_constant,
        }
    }

    /// Static gain K: total response over input step
    pub fn static_gain(&self) -> f64 {
        self.static_gain
    }

    /// Velocity gain Kv: steepest rate of change over input step
    pub fn velocity_gain(&self) -> f64 {
        self.velocity_gain
    }

    /// Apparent dead time L, in seconds
    pub fn dead_time(&self) -> f64 {
        self.dead_time
    }

    /// Time constant T, in seconds, net of dead time
    pub fn time_constant(&self) -> f64 {
        self.time_constant
    }
}

/// Extracts a `ProcessModel` from the response to an input step of `step` applied
/// `stable_time` after the first sample.
///
/// The dead time is read off the tangent through the point of steepest slope; the time
/// constant from the first sample closest to 63% of the total response.
///
/// # Returns
/// - `Err(TuningError::InvalidStep)` if `step` is zero or not finite.
/// - `Err(TuningError::DegenerateResponse)` if the response never rises.
pub fn identify(
    response: &StepResponse,
    step: f64,
    stable_time: Duration,
) -> Result<ProcessModel, TuningError> {
    if step == 0.0 || !step.is_finite() {
        return Err(TuningError::InvalidStep);
    }

    let samples = response.samples();
    let slopes = response.slopes();

    let t_start = response.first().timestamp + stable_time.as_secs_f64();
    let index_start = nearest(samples.iter().map(|s| s.timestamp), t_start);
    let start = samples[index_start];

    let total_response = response.last().value - start.value;
    let static_gain = total_response / step;

    let index_steep = first_max(&slopes);
    let slope_steep = slopes[index_steep];
    if slope_steep == 0.0 {
        return Err(TuningError::DegenerateResponse);
    }
    let steep = samples[index_steep];
    let velocity_gain = slope_steep / step;

    // Where the tangent through the steepest point crosses the initial level
    let dead_time = (steep.timestamp - t_start) - (steep.value - start.value) / slope_steep;

    let value_63 = start.value + TIME_CONSTANT_FRACTION * total_response;
    let index_63 = nearest(samples.iter().map(|s| s.value), value_63);
    let time_constant = samples[index_63].timestamp - t_start - dead_time;

    info!(
        static_gain,
        velocity_gain, dead_time, time_constant, "identified process model"
    );
    Ok(ProcessModel::new(
        static_gain,
        velocity_gain,
        dead_time,
        time_constant,
    ))
}

/// Index of the element closest to `target`; the first one wins a tie
fn nearest(values: impl Iterator<Item = f64>, target: f64) -> usize {
    let mut best = (0, f64::INFINITY);
    for (i, value) in values.enumerate() {
        let distance = (value - target).abs();
        if distance < best.1 {
            best = (i, distance);
        }
    }
    best.0
}

/// Index of the largest element; the first one wins a tie
fn first_max(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = i;
        }
    }
    best
}
