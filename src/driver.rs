// Control loop driver: auto-tuning followed by steady closed-loop control
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

//! The driver owns one control law and the collaborators it talks to, and runs the cycle
//! `read -> compute -> write -> wait` on a single thread until cancelled.
//!
//! ```text
//! Idle --run()--> Tuning --> Running --cancel / fatal error--> Stopped
//!        (skipped without a tuning configuration)
//! ```

use core::time::Duration;

use chrono::{TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::auth::{CredentialProvider, TokenCache};
use crate::config::{ConfigError, ControllerConfig};
use crate::identify::{identify, StepResponse};
use crate::interfaces::{
    CommandSink, HistoryService, MeasurementSource, ParameterStore, TransportError,
};
use crate::params::{param_queue, ControllerParams, ParamReceiver, ParamSender, ParamUpdate};
use crate::pid::{ControlMode, PidConfigError, PidController};
use crate::recorder::{CancelToken, ExperimentTarget, StepExperiment};
use crate::time::{Clock, InstantLike};
use crate::tuning::{TunedGains, TuningError, TuningLaw};

/// A control law the driver can run. Only `compute` is required; laws without modes or tunable
/// parameters can ignore the other hooks.
pub trait ControlLaw<I> {
    /// Computes the output for `measurement` taken at `now`
    fn compute(&mut self, measurement: f64, now: I) -> f64;

    /// Switches between automatic and manual operation
    fn set_mode(&mut self, _mode: ControlMode) {}

    /// Records an externally applied output and returns the value actually held
    fn set_manual_output(&mut self, output: f64) -> f64 {
        output
    }

    /// Applies a partial parameter update, all or nothing
    fn apply(&mut self, _update: &ParamUpdate<f64>) -> Result<(), PidConfigError> {
        Ok(())
    }

    /// The output the law currently holds, if it keeps one
    fn held_output(&self) -> Option<f64> {
        None
    }
}

impl<I: InstantLike> ControlLaw<I> for PidController<I, f64> {
    fn compute(&mut self, measurement: f64, now: I) -> f64 {
        PidController::compute(self, measurement, now)
    }

    fn set_mode(&mut self, mode: ControlMode) {
        PidController::set_mode(self, mode);
    }

    fn set_manual_output(&mut self, output: f64) -> f64 {
        PidController::set_manual_output(self, output)
    }

    fn apply(&mut self, update: &ParamUpdate<f64>) -> Result<(), PidConfigError> {
        PidController::apply(self, update)
    }

    fn held_output(&self) -> Option<f64> {
        Some(self.output())
    }
}

/// Lifecycle of a control loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, not started
    #[default]
    Idle,
    /// Running the step experiment
    Tuning,
    /// Running closed-loop control
    Running,
    /// Cancelled or terminated by a fatal error
    Stopped,
}

/// Errors that stop the control loop
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// A remote call failed with anything other than `NotFound`
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of a single control cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A new output was computed and sent
    Applied {
        /// Measurement the output was computed from
        measurement: f64,
        /// Output sent to the actuator
        output: f64,
    },
    /// An entity or attribute was missing; the engine is in manual mode holding its output
    Held(TransportError),
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Control cycles executed
    pub cycles: u64,
    /// Cycles that took longer than the sampling period
    pub overruns: u64,
    /// Cycles that held the output because something was missing upstream
    pub held: u64,
}

/// The remote collaborators of a control loop
pub struct Collaborators<I> {
    /// Source of the process variable and the actuator feedback
    pub measurements: Box<dyn MeasurementSource + Send>,
    /// Receiver of actuator commands
    pub commands: Box<dyn CommandSink + Send>,
    /// Holder of the editable controller parameters
    pub params: Box<dyn ParameterStore + Send>,
    /// Time-series store queried after a step experiment
    pub history: Box<dyn HistoryService<I> + Send>,
}

/// Remembers the last output the step experiment managed to apply
struct AppliedOutput<'a> {
    inner: &'a mut dyn CommandSink,
    last: Option<f64>,
}

impl CommandSink for AppliedOutput<'_> {
    fn write(&mut self, actuator: &str, command: &str, value: f64) -> Result<(), TransportError> {
        self.inner.write(actuator, command, value)?;
        self.last = Some(value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct TuningPlan {
    experiment: StepExperiment,
    law: TuningLaw,
}

/// Single-threaded control loop around a `ControlLaw`
pub struct ControlLoop<K: Clock, L> {
    config: ControllerConfig,
    period: Duration,
    tuning: Option<TuningPlan>,
    clock: K,
    law: L,
    io: Collaborators<K::Instant>,
    tokens: Option<TokenCache<Box<dyn CredentialProvider + Send>>>,
    token_min_validity: TimeDelta,
    updates: ParamReceiver,
    cancel: CancelToken,
    state: DriverState,
    last_params: Option<ControllerParams>,
    paused: bool,
}

impl<K: Clock> ControlLoop<K, PidController<K::Instant, f64>> {
    /// Creates a loop running a `PidController` built from the configured initial parameters
    pub fn with_pid(
        config: ControllerConfig,
        clock: K,
        io: Collaborators<K::Instant>,
    ) -> Result<(Self, ParamSender), ConfigError> {
        let law = PidController::new_uninit(config.pid_config()?);
        Self::new(config, clock, law, io)
    }
}

impl<K: Clock, L: ControlLaw<K::Instant>> ControlLoop<K, L> {
    /// Validates `config` and creates an idle loop, together with the sending end of its
    /// parameter queue.
    pub fn new(
        config: ControllerConfig,
        clock: K,
        law: L,
        io: Collaborators<K::Instant>,
    ) -> Result<(Self, ParamSender), ConfigError> {
        config.validate()?;
        let period = config.period()?;
        let token_min_validity = config.token_min_validity()?;
        let tuning = match &config.tuning {
            Some(tuning) => Some(TuningPlan {
                experiment: tuning.experiment()?,
                law: tuning.law,
            }),
            None => None,
        };
        let (sender, updates) = param_queue();

        let driver = Self {
            config,
            period,
            tuning,
            clock,
            law,
            io,
            tokens: None,
            token_min_validity,
            updates,
            cancel: CancelToken::new(),
            state: DriverState::Idle,
            last_params: None,
            paused: false,
        };
        Ok((driver, sender))
    }

    /// Enables secured mode: a token is fetched from `provider`, renewed before it expires and
    /// handed to every collaborator at the start of each cycle.
    pub fn with_credentials(mut self, provider: Box<dyn CredentialProvider + Send>) -> Self {
        self.tokens = Some(TokenCache::new(provider, self.token_min_validity));
        self
    }

    /// A handle that stops the loop, or aborts a running experiment, from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The control law
    pub fn law(&self) -> &L {
        &self.law
    }

    /// The clock
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Makes sure the parameter store holds an entry for this controller, creating it from the
    /// configured initial parameters if it is missing. An existing entry is left as is.
    pub fn register(&mut self) -> Result<(), DriverError> {
        self.refresh_credentials()?;
        let id = self.config.controller_id.as_str();
        match self.io.params.read_params(id) {
            Ok(_) => {
                warn!(controller = id, "controller entry already exists, keeping its parameters");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                info!(controller = id, "creating controller entry");
                let initial: ParamUpdate<f64> = self.config.params.into();
                self.io.params.write_params(id, &initial)?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Runs an open-loop step experiment, identifies the process and applies the gains of
    /// `law` to the parameter store and the control law.
    ///
    /// Whatever the outcome, the control law resumes without a bump from the last output the
    /// experiment applied. On failure the previous gains stay in place.
    pub fn tune(
        &mut self,
        experiment: &StepExperiment,
        law: TuningLaw,
    ) -> Result<TunedGains, TuningError> {
        self.state = DriverState::Tuning;
        self.refresh_credentials()?;

        let target = ExperimentTarget {
            actuator: &self.config.actuator,
            command: &self.config.command,
            series: self.config.tuning_series(),
        };
        let mut sink = AppliedOutput {
            inner: self.io.commands.as_mut(),
            last: None,
        };
        let recorded = experiment.record(
            &self.clock,
            target,
            &mut sink,
            self.io.history.as_mut(),
            &self.cancel,
        );
        let applied = sink.last;

        let result = recorded.and_then(|response| self.adopt_gains(&response, experiment, law));
        if let Some(output) = applied {
            self.hand_over(output);
        }
        result
    }

    fn adopt_gains(
        &mut self,
        response: &StepResponse,
        experiment: &StepExperiment,
        law: TuningLaw,
    ) -> Result<TunedGains, TuningError> {
        let model = identify(response, experiment.step, experiment.stable_time)?;
        let gains = law.gains(&model)?;
        if ![gains.kp, gains.ki, gains.kd].iter().all(|g| g.is_finite()) {
            return Err(TuningError::InapplicableModel("tuned gains are not finite"));
        }
        info!(kp = gains.kp, ki = gains.ki, kd = gains.kd, ?law, "tuned gains");

        // The store first: if it rejects the gains, the law keeps its own
        let update = ParamUpdate::from(gains);
        self.io
            .params
            .write_params(&self.config.controller_id, &update)?;
        self.law
            .apply(&update)
            .map_err(|_| TuningError::InapplicableModel("control law rejected the tuned gains"))?;
        Ok(gains)
    }

    /// Reseeds the law at `output`, already applied to the actuator
    fn hand_over(&mut self, output: f64) {
        self.law.set_mode(ControlMode::Manual);
        self.law.set_manual_output(output);
        self.law.set_mode(ControlMode::Auto);
    }

    /// Runs one control cycle without waiting for the sampling period.
    ///
    /// A `NotFound` from any collaborator switches the law to manual mode and holds its output;
    /// the next successful cycle resumes bumplessly. Any other transport error is returned.
    pub fn step(&mut self) -> Result<CycleOutcome, DriverError> {
        match self.exchange() {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_not_found() => {
                if !self.paused {
                    warn!(error = %err, "missing upstream data, holding output");
                    self.law.set_mode(ControlMode::Manual);
                    self.paused = true;
                }
                Ok(CycleOutcome::Held(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Auto-tunes if configured, then runs control cycles at the sampling period until the
    /// cancel token is triggered or a fatal error occurs.
    pub fn run(&mut self) -> Result<RunSummary, DriverError> {
        self.run_inner(None)
    }

    /// Like `run`, but also stops after `cycles` control cycles
    pub fn run_cycles(&mut self, cycles: u64) -> Result<RunSummary, DriverError> {
        self.run_inner(Some(cycles))
    }

    fn run_inner(&mut self, limit: Option<u64>) -> Result<RunSummary, DriverError> {
        let span = info_span!("control_loop", controller = %self.config.controller_id);
        let _guard = span.enter();

        if let Err(err) = self.register() {
            error!(error = %err, "could not register controller");
            self.state = DriverState::Stopped;
            return Err(err);
        }

        if let Some(plan) = self.tuning {
            match self.tune(&plan.experiment, plan.law) {
                Ok(_) => {}
                Err(TuningError::Transport(err)) if !err.is_not_found() => {
                    error!(error = %err, "transport failure during auto-tuning");
                    self.state = DriverState::Stopped;
                    return Err(err.into());
                }
                Err(err) => warn!(error = %err, "auto-tuning aborted, keeping previous gains"),
            }
        }

        self.state = DriverState::Running;
        info!(period = ?self.period, "entering closed-loop control");

        let mut summary = RunSummary::default();
        while !self.cancel.is_cancelled() && limit.map_or(true, |limit| summary.cycles < limit) {
            let started = self.clock.now();
            match self.step() {
                Ok(CycleOutcome::Applied { .. }) => {}
                Ok(CycleOutcome::Held(_)) => summary.held += 1,
                Err(err) => {
                    error!(error = %err, "control loop stopped");
                    self.state = DriverState::Stopped;
                    return Err(err);
                }
            }
            summary.cycles += 1;
            if !self.hold_period(started) {
                summary.overruns += 1;
            }
        }

        self.state = DriverState::Stopped;
        info!(?summary, "control loop finished");
        Ok(summary)
    }

    fn exchange(&mut self) -> Result<CycleOutcome, TransportError> {
        self.refresh_credentials()?;
        self.apply_queued_updates()?;
        self.sync_params()?;

        let measurement = self.io.measurements.read(&self.config.process_variable)?;
        if self.paused {
            self.resume()?;
        }

        let previous = self.law.held_output();
        let output = self.law.compute(measurement, self.clock.now());
        if let Err(err) = self
            .io
            .commands
            .write(&self.config.actuator, &self.config.command, output)
        {
            // The actuator still holds the previous output
            self.law.set_mode(ControlMode::Manual);
            if let Some(previous) = previous {
                self.law.set_manual_output(previous);
            }
            return Err(err);
        }
        debug!(measurement, output, "control cycle");
        Ok(CycleOutcome::Applied {
            measurement,
            output,
        })
    }

    fn refresh_credentials(&mut self) -> Result<(), TransportError> {
        let Some(cache) = self.tokens.as_mut() else {
            return Ok(());
        };
        let token = cache.ensure_fresh(Utc::now())?;
        self.io.measurements.authorize(token);
        self.io.commands.authorize(token);
        self.io.params.authorize(token);
        self.io.history.authorize(token);
        Ok(())
    }

    /// Locally queued edits are applied in order and forwarded to the store, so that the read
    /// that follows sees them.
    fn apply_queued_updates(&mut self) -> Result<(), TransportError> {
        let updates: Vec<_> = self.updates.drain().collect();
        for update in updates {
            if update.is_empty() {
                continue;
            }
            match self.law.apply(&update) {
                Ok(()) => {
                    info!(?update, "applied queued parameter update");
                    self.io
                        .params
                        .write_params(&self.config.controller_id, &update)?;
                }
                Err(err) => warn!(error = %err, ?update, "discarded queued parameter update"),
            }
        }
        Ok(())
    }

    fn sync_params(&mut self) -> Result<(), TransportError> {
        let params = self.io.params.read_params(&self.config.controller_id)?;
        if self.last_params == Some(params) {
            return Ok(());
        }
        match self.law.apply(&params.into()) {
            Ok(()) => {
                info!(?params, "controller parameters changed");
                self.last_params = Some(params);
            }
            Err(err) => warn!(error = %err, ?params, "rejected controller parameters"),
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), TransportError> {
        if let Some(feedback) = &self.config.actuator_feedback {
            match self.io.measurements.read(feedback) {
                Ok(value) if value.is_finite() => {
                    let held = self.law.set_manual_output(value);
                    debug!(held, "warm start from actuator feedback");
                }
                Ok(_) => {}
                Err(err) if err.is_not_found() => {
                    debug!(error = %err, "no actuator feedback, resuming from held output");
                }
                Err(err) => return Err(err),
            }
        }
        self.law.set_mode(ControlMode::Auto);
        self.paused = false;
        info!("upstream data available again, resuming control");
        Ok(())
    }

    /// Waits out the rest of the sampling period. Returns false on an overrun, in which case the
    /// next cycle starts immediately.
    fn hold_period(&self, started: K::Instant) -> bool {
        let elapsed = self.clock.now().duration_since(started);
        if elapsed > self.period {
            warn!(
                ?elapsed,
                period = ?self.period,
                "control cycle overran its sampling period"
            );
            return false;
        }
        self.clock.sleep(self.period - elapsed);
        true
    }
}
