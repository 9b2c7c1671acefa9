// Simulated plants and collaborators for tests, benchmarks and demos
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
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::driver::Collaborators;
use crate::identify::StepResponseSample;
use crate::interfaces::{
    CommandSink, HistoryService, MeasurementSource, ParameterStore, TransportError,
};
use crate::params::{ControllerParams, ParamUpdate};
use crate::time::{Clock, SimulatedClock, TimeF64};

/// Internal integration step of `FirstOrderPlant`, in seconds
const INTEGRATION_STEP: f64 = 0.01;

/// A first-order-plus-dead-time process:
///
/// T·y'(t) = baseline + K·u(t − L) − y(t)
///
/// Inputs are held constant between changes, so each integration step is solved exactly.
#[derive(Debug, Clone)]
pub struct FirstOrderPlant {
    gain: f64,
    time_constant: f64,
    dead_time: f64,
    baseline: f64,
    value: f64,
    time: f64,
    /// Input changes as (time applied, value), oldest first
    inputs: VecDeque<(f64, f64)>,
}

impl FirstOrderPlant {
    /// Creates a plant at rest at `baseline` with zero input, starting at time `start`
    pub fn new(gain: f64, time_constant: f64, dead_time: f64, baseline: f64, start: f64) -> Self {
        Self {
            gain,
            time_constant,
            dead_time,
            baseline,
            value: baseline,
            time: start,
            inputs: VecDeque::new(),
        }
    }

    /// Starts the plant at steady state under a constant `input` applied since forever
    pub fn settled(mut self, input: f64) -> Self {
        self.inputs.clear();
        self.inputs.push_back((f64::NEG_INFINITY, input));
        self.value = self.baseline + self.gain * input;
        self
    }

    /// Current output
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Current simulation time, in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Changes the input from now on. It reaches the output after the dead time.
    pub fn set_input(&mut self, input: f64) {
        self.inputs.push_back((self.time, input));
    }

    /// Input acting on the output at time `t`
    fn delayed_input(&self, t: f64) -> f64 {
        self.inputs
            .iter()
            .rev()
            .find(|(applied, _)| *applied <= t - self.dead_time)
            .map_or(0.0, |(_, input)| *input)
    }

    /// Advances the plant by `duration` seconds. Non-positive durations are ignored.
    pub fn advance(&mut self, duration: f64) {
        let end = self.time + duration;
        while self.time < end {
            let remaining = end - self.time;
            let h = INTEGRATION_STEP.min(remaining);
            let target = self.baseline + self.gain * self.delayed_input(self.time);
            self.value = target + (self.value - target) * (-h / self.time_constant).exp();
            self.time = if h < remaining { self.time + h } else { end };
        }

        // Changes that stopped acting on the output are no longer needed
        while self.inputs.len() > 1 && self.inputs[1].0 <= self.time - self.dead_time {
            self.inputs.pop_front();
        }
    }
}

struct ProcessState {
    plant: FirstOrderPlant,
    process_variable: String,
    actuator: String,
    feedback: Option<String>,
    command: Option<f64>,
    offline: bool,
    start: f64,
    sample_period: f64,
    recorded: u64,
    history: Vec<StepResponseSample>,
    controllers: HashMap<String, ControllerParams>,
}

impl ProcessState {
    /// Brings the plant up to `now`, recording a history sample at every sample instant passed
    fn sync(&mut self, now: f64) {
        loop {
            let next = self.start + self.recorded as f64 * self.sample_period;
            if next > now {
                break;
            }
            self.plant.advance(next - self.plant.time());
            self.history
                .push(StepResponseSample::new(next, self.plant.value()));
            self.recorded += 1;
        }
        self.plant.advance(now - self.plant.time());
    }
}

/// An in-memory process exposing every collaborator interface of the control loop.
///
/// The plant is advanced lazily to the time of the shared `SimulatedClock` whenever a
/// collaborator method is called. Clones share the same process.
#[derive(Clone)]
pub struct SimulatedProcess {
    clock: SimulatedClock,
    latency: Duration,
    state: Arc<Mutex<ProcessState>>,
}

impl SimulatedProcess {
    /// Wraps `plant`, measured as `process_variable` and driven through `actuator`. The process
    /// variable is recorded every 100 ms.
    pub fn new(
        clock: SimulatedClock,
        plant: FirstOrderPlant,
        process_variable: impl Into<String>,
        actuator: impl Into<String>,
    ) -> Self {
        let start = clock.now().as_secs_f64();
        let state = ProcessState {
            plant,
            process_variable: process_variable.into(),
            actuator: actuator.into(),
            feedback: None,
            command: None,
            offline: false,
            start,
            sample_period: 0.1,
            recorded: 0,
            history: Vec::new(),
            controllers: HashMap::new(),
        };
        Self {
            clock,
            latency: Duration::ZERO,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Reports the last command under attribute `feedback`
    pub fn with_feedback(self, feedback: impl Into<String>) -> Self {
        self.state.lock().feedback = Some(feedback.into());
        self
    }

    /// Records the process variable at `period` instead of every 100 ms
    pub fn with_sample_period(self, period: Duration) -> Self {
        self.state.lock().sample_period = period.as_secs_f64();
        self
    }

    /// Every collaborator call takes `latency` of simulated time
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// While offline, reading the process variable fails with `NotFound`
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Current plant output
    pub fn value(&self) -> f64 {
        self.synced().plant.value()
    }

    /// Last command received, if any
    pub fn last_command(&self) -> Option<f64> {
        self.state.lock().command
    }

    /// Stored parameters of `controller`
    pub fn params(&self, controller: &str) -> Option<ControllerParams> {
        self.state.lock().controllers.get(controller).copied()
    }

    /// Every recorded sample so far
    pub fn history(&self) -> Vec<StepResponseSample> {
        self.synced().history.clone()
    }

    /// Boxed handles to this process for every collaborator slot of a control loop
    pub fn collaborators(&self) -> Collaborators<TimeF64> {
        Collaborators {
            measurements: Box::new(self.clone()),
            commands: Box::new(self.clone()),
            params: Box::new(self.clone()),
            history: Box::new(self.clone()),
        }
    }

    fn synced(&self) -> MutexGuard<'_, ProcessState> {
        let now = self.clock.now().as_secs_f64();
        let mut state = self.state.lock();
        state.sync(now);
        state
    }

    fn call(&self) -> MutexGuard<'_, ProcessState> {
        if !self.latency.is_zero() {
            self.clock.advance(self.latency);
        }
        self.synced()
    }
}

impl MeasurementSource for SimulatedProcess {
    fn read(&mut self, process_variable: &str) -> Result<f64, TransportError> {
        let state = self.call();
        if process_variable == state.process_variable && !state.offline {
            Ok(state.plant.value())
        } else if state.feedback.as_deref() == Some(process_variable) {
            state
                .command
                .ok_or_else(|| TransportError::NotFound(process_variable.to_owned()))
        } else {
            Err(TransportError::NotFound(process_variable.to_owned()))
        }
    }
}

impl CommandSink for SimulatedProcess {
    fn write(&mut self, actuator: &str, _command: &str, value: f64) -> Result<(), TransportError> {
        let mut state = self.call();
        if actuator != state.actuator {
            return Err(TransportError::NotFound(actuator.to_owned()));
        }
        state.plant.set_input(value);
        state.command = Some(value);
        Ok(())
    }
}

impl ParameterStore for SimulatedProcess {
    fn read_params(&mut self, controller: &str) -> Result<ControllerParams, TransportError> {
        self.call()
            .controllers
            .get(controller)
            .copied()
            .ok_or_else(|| TransportError::NotFound(controller.to_owned()))
    }

    fn write_params(
        &mut self,
        controller: &str,
        update: &ParamUpdate<f64>,
    ) -> Result<(), TransportError> {
        let mut state = self.call();
        let current = match state.controllers.get(controller) {
            Some(params) => *params,
            None => full_params(update)
                .ok_or_else(|| TransportError::NotFound(controller.to_owned()))?,
        };
        let merged = ControllerParams {
            kp: update.kp.unwrap_or(current.kp),
            ki: update.ki.unwrap_or(current.ki),
            kd: update.kd.unwrap_or(current.kd),
            low: update.output_min.unwrap_or(current.low),
            high: update.output_max.unwrap_or(current.high),
            setpoint: update.setpoint.unwrap_or(current.setpoint),
        };
        state.controllers.insert(controller.to_owned(), merged);
        Ok(())
    }
}

impl HistoryService<TimeF64> for SimulatedProcess {
    fn query(
        &mut self,
        series: &str,
        from: TimeF64,
        to: TimeF64,
    ) -> Result<Vec<StepResponseSample>, TransportError> {
        let state = self.call();
        if series != state.process_variable {
            return Err(TransportError::NotFound(series.to_owned()));
        }
        Ok(state
            .history
            .iter()
            .filter(|s| s.timestamp >= from.as_secs_f64() && s.timestamp <= to.as_secs_f64())
            .copied()
            .collect())
    }
}

/// A missing entry can only be created from an update carrying every field
fn full_params(update: &ParamUpdate<f64>) -> Option<ControllerParams> {
    Some(ControllerParams {
        kp: update.kp?,
        ki: update.ki?,
        kd: update.kd?,
        low: update.output_min?,
        high: update.output_max?,
        setpoint: update.setpoint?,
    })
}

#[cfg(feature = "simulation")]
pub use self::mass_spring_damper::MassSpringDamper;

#[cfg(feature = "simulation")]
mod mass_spring_damper {
    use nalgebra as na;

    /// A second-order plant, for closed-loop checks against something less forgiving than a
    /// first-order lag.
    #[derive(Debug, Clone, Copy)]
    pub struct MassSpringDamper {
        /// Natural frequency ωₙ, in rad/s
        pub natural_frequency: f64,
        /// Damping ratio ζ
        pub damping_ratio: f64,
    }

    impl MassSpringDamper {
        /// Implements the state-space realization of the mass-spring-damper system:
        /// ┌     ┐   ┌              ┐┌    ┐   ┌     ┐
        /// │ p'  │ = │  0     1     ││ p  │ + │ 0   │ u
        /// │ p'' │   │  -ωₙ²  -2ζωₙ ││ p' │   │ ωₙ² │
        /// └     ┘   └              ┘└    ┘   └     ┘
        pub fn f(&self, x: na::Vector2<f64>, u: f64) -> na::Vector2<f64> {
            let omega_sq = self.natural_frequency.powi(2);
            let two_zeta_omega = 2.0 * self.natural_frequency * self.damping_ratio;

            let mat_a = na::Matrix2::new(0.0, 1.0, -omega_sq, -two_zeta_omega);
            let mat_b = na::Vector2::new(0.0, omega_sq);

            mat_a * x + mat_b * u
        }

        /// Position output
        pub fn h(&self, x: na::Vector2<f64>) -> f64 {
            x[0]
        }

        /// One classical Runge-Kutta step of `dt` seconds with the input held constant
        pub fn rk4_step(&self, x: na::Vector2<f64>, u: f64, dt: f64) -> na::Vector2<f64> {
            let k1 = self.f(x, u);
            let k2 = self.f(x + k1 * (dt / 2.0), u);
            let k3 = self.f(x + k2 * (dt / 2.0), u);
            let k4 = self.f(x + k3 * dt, u);
            x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
        }
    }
}
