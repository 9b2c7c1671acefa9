// Discrete PID engine with anti-windup, reverse action and bumpless transfer
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

use num_traits::{clamp, Float};
use thiserror::Error;

use crate::params::ParamUpdate;
use crate::time::InstantLike;

/// Errors raised when a PID configuration would be invalid. A failed setter never modifies the
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PidConfigError {
    /// Proportional gain is NaN or infinite
    #[error("proportional gain must be finite")]
    InvalidProportionalGain,

    /// Integral gain is NaN or infinite
    #[error("integral gain must be finite")]
    InvalidIntegralGain,

    /// Derivative gain is NaN or infinite
    #[error("derivative gain must be finite")]
    InvalidDerivativeGain,

    /// Setpoint is NaN or infinite
    #[error("setpoint must be finite")]
    InvalidSetpoint,

    /// Lower limit exceeds upper limit, or either is NaN
    #[error("output limits must satisfy low <= high and must not be NaN")]
    InvalidOutputLimits,

    /// Fixed integration interval is zero
    #[error("fixed sample interval must be greater than zero")]
    InvalidSampleTime,
}

/// Gains, setpoint, limits and timing of a PID controller.
///
/// All setters validate their arguments. Negative gains are accepted: they are one way of
/// expressing reverse action, and the engine makes no attempt to rule out unstable tunings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PidConfig<F> {
    /// Proportional gain coefficient.
    /// Defaults to 1.0.
    kp: F,

    /// Integral gain coefficient, per second.
    /// Defaults to 0.01, i.e. an integral time of 100s at unity proportional gain.
    /// Only a strictly positive value enables integral action.
    ki: F,

    /// Derivative gain coefficient, in seconds.
    /// Defaults to 0.0.
    kd: F,

    /// Desired process value.
    /// Defaults to 0.0.
    setpoint: F,

    /// Minimum output value of the PID controller.
    /// Defaults to negative infinity, i.e. no limit.
    output_min: F,

    /// Maximum output value of the PID controller.
    /// Defaults to positive infinity, i.e. no limit.
    output_max: F,

    /// Negates the control error, for plants where raising the output lowers the measurement
    /// (cooling instead of heating).
    /// Defaults to false.
    reverse_action: bool,

    /// Interval assumed between two evaluations. If `None`, the time elapsed between two calls
    /// to `compute` is used instead.
    /// Defaults to `None`.
    fixed_interval: Option<Duration>,
}

impl<F: Float> Default for PidConfig<F> {
    fn default() -> Self {
        PidConfig {
            kp: F::one(),
            ki: lit(0.01),
            kd: F::zero(),
            setpoint: F::zero(),
            output_min: F::neg_infinity(),
            output_max: F::infinity(),
            reverse_action: false,
            fixed_interval: None,
        }
    }
}

impl<F: Float> PidConfig<F> {
    /// Returns the proportional gain.
    pub fn kp(&self) -> F {
        self.kp
    }

    /// Returns the integral gain.
    pub fn ki(&self) -> F {
        self.ki
    }

    /// Returns the derivative gain.
    pub fn kd(&self) -> F {
        self.kd
    }

    /// Convenience method that returns the proportional, integral, and derivative gains together as a tuple.
    pub fn gains(&self) -> (F, F, F) {
        (self.kp, self.ki, self.kd)
    }

    /// Returns the setpoint.
    pub fn setpoint(&self) -> F {
        self.setpoint
    }

    /// Returns the minimum output limit.
    pub fn output_min(&self) -> F {
        self.output_min
    }

    /// Returns the maximum output limit.
    pub fn output_max(&self) -> F {
        self.output_max
    }

    /// Returns whether the control error is negated.
    pub fn reverse_action(&self) -> bool {
        self.reverse_action
    }

    /// Returns the fixed integration interval, if any.
    pub fn fixed_interval(&self) -> Option<Duration> {
        self.fixed_interval
    }

    /// Sets the proportional gain.
    ///
    /// # Returns
    /// - `Err(PidConfigError::InvalidProportionalGain)` if the gain is not finite.
    pub fn set_kp(&mut self, kp: F) -> Result<(), PidConfigError> {
        if !kp.is_finite() {
            return Err(PidConfigError::InvalidProportionalGain);
        }
        self.kp = kp;
        Ok(())
    }

    /// Sets the integral gain. Zero (or a negative value) disables integral action entirely.
    ///
    /// # Returns
    /// - `Err(PidConfigError::InvalidIntegralGain)` if the gain is not finite.
    pub fn set_ki(&mut self, ki: F) -> Result<(), PidConfigError> {
        if !ki.is_finite() {
            return Err(PidConfigError::InvalidIntegralGain);
        }
        self.ki = ki;
        Ok(())
    }

    /// Sets the derivative gain. Zero disables derivative action.
    ///
    /// # Returns
    /// - `Err(PidConfigError::InvalidDerivativeGain)` if the gain is not finite.
    pub fn set_kd(&mut self, kd: F) -> Result<(), PidConfigError> {
        if !kd.is_finite() {
            return Err(PidConfigError::InvalidDerivativeGain);
        }
        self.kd = kd;
        Ok(())
    }

    /// Convenience method to set the proportional, integral, and derivative gains together.
    /// Either all three gains are set or none is.
    pub fn set_gains(&mut self, kp: F, ki: F, kd: F) -> Result<(), PidConfigError> {
        let mut next = *self;
        next.set_kp(kp)?;
        next.set_ki(ki)?;
        next.set_kd(kd)?;
        *self = next;
        Ok(())
    }

    /// Sets the setpoint.
    pub fn set_setpoint(&mut self, setpoint: F) -> Result<(), PidConfigError> {
        if !setpoint.is_finite() {
            return Err(PidConfigError::InvalidSetpoint);
        }
        self.setpoint = setpoint;
        Ok(())
    }

    /// Sets the minimum and maximum output limits for the PID controller.
    ///
    /// These limits may be set to infinity to disable clamping. Equal limits are accepted and
    /// pin the output to a constant.
    ///
    /// # Returns
    /// - `Err(PidConfigError::InvalidOutputLimits)` if the minimum limit is greater than the
    ///   maximum limit, or either limit is NaN.
    pub fn set_output_limits(&mut self, output_min: F, output_max: F) -> Result<(), PidConfigError> {
        if output_min.is_nan() || output_max.is_nan() || output_min > output_max {
            return Err(PidConfigError::InvalidOutputLimits);
        }

        self.output_min = output_min;
        self.output_max = output_max;
        Ok(())
    }

    /// Sets whether the control error is negated.
    pub fn set_reverse_action(&mut self, reverse_action: bool) {
        self.reverse_action = reverse_action;
    }

    /// Sets the fixed integration interval. `None` switches to measured wall-clock intervals.
    ///
    /// # Returns
    /// - `Err(PidConfigError::InvalidSampleTime)` if the interval is zero.
    pub fn set_fixed_interval(&mut self, interval: Option<Duration>) -> Result<(), PidConfigError> {
        if interval.is_some_and(|it| it.is_zero()) {
            return Err(PidConfigError::InvalidSampleTime);
        }
        self.fixed_interval = interval;
        Ok(())
    }

    /// Applies a partial parameter update. The update is validated as a whole: if any field is
    /// rejected, the configuration is left untouched.
    pub fn apply(&mut self, update: &ParamUpdate<F>) -> Result<(), PidConfigError> {
        let mut next = *self;
        if let Some(kp) = update.kp {
            next.set_kp(kp)?;
        }
        if let Some(ki) = update.ki {
            next.set_ki(ki)?;
        }
        if let Some(kd) = update.kd {
            next.set_kd(kd)?;
        }
        if let Some(setpoint) = update.setpoint {
            next.set_setpoint(setpoint)?;
        }
        if update.output_min.is_some() || update.output_max.is_some() {
            next.set_output_limits(
                update.output_min.unwrap_or(next.output_min),
                update.output_max.unwrap_or(next.output_max),
            )?;
        }
        *self = next;
        Ok(())
    }
}

/// Builds a validated `PidConfig`. Unset fields take the values of `PidConfig::default()`.
#[derive(Copy, Clone, Debug)]
pub struct PidConfigBuilder<F> {
    kp: F,
    ki: F,
    kd: F,
    setpoint: F,
    output_min: F,
    output_max: F,
    reverse_action: bool,
    fixed_interval: Option<Duration>,
}

impl<F: Float> Default for PidConfigBuilder<F> {
    fn default() -> Self {
        let config = PidConfig::<F>::default();
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            setpoint: config.setpoint,
            output_min: config.output_min,
            output_max: config.output_max,
            reverse_action: config.reverse_action,
            fixed_interval: config.fixed_interval,
        }
    }
}

impl<F: Float> PidConfigBuilder<F> {
    /// Proportional gain
    pub fn kp(mut self, kp: F) -> Self {
        self.kp = kp;
        self
    }

    /// Integral gain
    pub fn ki(mut self, ki: F) -> Self {
        self.ki = ki;
        self
    }

    /// Derivative gain
    pub fn kd(mut self, kd: F) -> Self {
        self.kd = kd;
        self
    }

    /// Setpoint
    pub fn setpoint(mut self, setpoint: F) -> Self {
        self.setpoint = setpoint;
        self
    }

    /// Output limits
    pub fn output_limits(mut self, output_min: F, output_max: F) -> Self {
        self.output_min = output_min;
        self.output_max = output_max;
        self
    }

    /// Reverse action flag
    pub fn reverse_action(mut self, reverse_action: bool) -> Self {
        self.reverse_action = reverse_action;
        self
    }

    /// Fixed integration interval
    pub fn fixed_interval(mut self, interval: Duration) -> Self {
        self.fixed_interval = Some(interval);
        self
    }

    /// Validates every field and produces the configuration
    pub fn build(self) -> Result<PidConfig<F>, PidConfigError> {
        let mut config = PidConfig::default();
        config.set_kp(self.kp)?;
        config.set_ki(self.ki)?;
        config.set_kd(self.kd)?;
        config.set_setpoint(self.setpoint)?;
        config.set_output_limits(self.output_min, self.output_max)?;
        config.set_reverse_action(self.reverse_action);
        config.set_fixed_interval(self.fixed_interval)?;
        Ok(config)
    }
}

/// Operating mode of the controller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ControlMode {
    /// The controller computes its output from the measurement.
    #[default]
    Auto,
    /// Output computation is suspended; the output is supplied externally.
    Manual,
}

/// Mutable state of a PID controller.
#[derive(Copy, Clone, Debug)]
pub struct PidContext<I, F> {
    integrator: F,
    last_err: F,
    last_derivative: F,
    last_output: F,
    last_time: Option<I>,
    mode: ControlMode,
    need_reseed: bool,
}

impl<I: InstantLike, F: Float> PidContext<I, F> {
    /// Creates a context with zero state. The first evaluation only establishes timekeeping when
    /// intervals are measured, and never produces a derivative kick.
    pub fn new_uninit() -> Self {
        Self {
            integrator: F::zero(),
            last_err: F::zero(),
            last_derivative: F::zero(),
            last_output: F::zero(),
            last_time: None,
            mode: ControlMode::Auto,
            need_reseed: false,
        }
    }

    /// Creates a context for a process already settled at `output` with zero error, e.g. when
    /// taking over from a manually operated actuator. The integrator carries the whole output.
    pub fn new(timestamp: I, output: F) -> Self {
        Self {
            integrator: output,
            last_output: output,
            last_time: Some(timestamp),
            ..Self::new_uninit()
        }
    }

    /// Most recently applied output
    pub fn output(&self) -> F {
        self.last_output
    }

    /// Error seen at the last evaluation
    pub fn error(&self) -> F {
        self.last_err
    }

    /// Accumulated integral term
    pub fn integrator(&self) -> F {
        self.integrator
    }

    /// Timestamp of the last evaluation, `None` before the first one
    pub fn last_time(&self) -> Option<I> {
        self.last_time
    }

    /// Current operating mode
    pub fn mode(&self) -> ControlMode {
        self.mode
    }
}

/// A functional implementation of a PID (Proportional-Integral-Derivative) controller.
///
/// This implementation is stateless so a context object must be passed in and returned with each
/// call to `compute`. After modifying the output limits through `config_mut`, pass the context
/// through `reclamp` to keep the held output within the new limits.
#[derive(Copy, Clone, Debug)]
pub struct FuncPidController<F> {
    config: PidConfig<F>,
}

impl<F: Float> FuncPidController<F> {
    /// Creates a controller from a validated configuration
    pub fn new(config: PidConfig<F>) -> Self {
        FuncPidController { config }
    }

    /// Returns the configuration
    pub fn config(&self) -> &PidConfig<F> {
        &self.config
    }

    /// Returns the configuration for in-place tuning
    pub fn config_mut(&mut self) -> &mut PidConfig<F> {
        &mut self.config
    }

    /// Computes the control output for `measurement` taken at `now`.
    ///
    /// In manual mode, or if the measurement is not finite, the held output is returned and the
    /// context is left as is.
    pub fn compute<I: InstantLike>(
        &self,
        mut ctx: PidContext<I, F>,
        measurement: F,
        now: I,
    ) -> (F, PidContext<I, F>) {
        if ctx.mode == ControlMode::Manual || !measurement.is_finite() {
            return (ctx.last_output, ctx);
        }

        let cfg = &self.config;
        let error = if cfg.reverse_action {
            measurement - cfg.setpoint
        } else {
            cfg.setpoint - measurement
        };

        let elapsed = match cfg.fixed_interval {
            Some(interval) => Some(interval),
            None => ctx.last_time.map(|last| now.duration_since(last)),
        };
        if ctx.last_time.is_none() {
            ctx.last_err = error;
        }
        ctx.last_time = Some(now);

        // A non-positive interval is a repeated evaluation: P is recomputed, I and D are not
        let mut dt = elapsed.map(secs::<F>).filter(|dt| *dt > F::zero());

        // First evaluation after a manual-to-auto transfer starts exactly from the held output
        if ctx.need_reseed {
            ctx.integrator = ctx.last_output - cfg.kp * error;
            ctx.need_reseed = false;
            dt = None;
        }

        let derivative = match dt {
            Some(dt) => {
                ctx.integrator = if cfg.ki > F::zero() {
                    ctx.integrator + cfg.ki * error * dt
                } else {
                    F::zero()
                };

                if cfg.kd != F::zero() {
                    cfg.kd * (error - ctx.last_err) / dt
                } else {
                    F::zero()
                }
            }
            None => F::zero(),
        };

        let unclamped = cfg.kp * error + ctx.integrator + derivative;
        let output = clamp(unclamped, cfg.output_min, cfg.output_max);

        // Back-solve the integrator so that the same error reproduces the clamped output
        if output != unclamped {
            ctx.integrator = output - cfg.kp * error - derivative;
        }

        ctx.last_err = error;
        ctx.last_derivative = derivative;
        ctx.last_output = output;
        (output, ctx)
    }

    /// Switches the operating mode.
    ///
    /// Entering auto mode from manual mode reseeds the integrator from the held output so that
    /// the output continues without a jump.
    pub fn set_mode<I: InstantLike>(
        &self,
        mut ctx: PidContext<I, F>,
        mode: ControlMode,
    ) -> PidContext<I, F> {
        if ctx.mode == mode {
            return ctx;
        }
        if mode == ControlMode::Auto {
            ctx.integrator = ctx.last_output - self.config.kp * ctx.last_err;
            ctx.need_reseed = true;
        }
        ctx.mode = mode;
        ctx
    }

    /// Records an externally applied output, clamped to the output limits. NaN is ignored.
    pub fn set_manual_output<I: InstantLike>(
        &self,
        mut ctx: PidContext<I, F>,
        output: F,
    ) -> PidContext<I, F> {
        if output.is_nan() {
            return ctx;
        }
        ctx.last_output = clamp(output, self.config.output_min, self.config.output_max);
        ctx.integrator = ctx.last_output - self.config.kp * ctx.last_err - ctx.last_derivative;
        ctx
    }

    /// Brings the held output back within the current output limits, back-solving the integrator
    /// if the output had to move.
    pub fn reclamp<I: InstantLike>(&self, mut ctx: PidContext<I, F>) -> PidContext<I, F> {
        let clamped = clamp(ctx.last_output, self.config.output_min, self.config.output_max);
        if clamped != ctx.last_output {
            ctx.last_output = clamped;
            ctx.integrator = clamped - self.config.kp * ctx.last_err - ctx.last_derivative;
        }
        ctx
    }
}

/// A stateful implementation of a PID (Proportional-Integral-Derivative) controller.
///
/// This implementation maintains its own context. Configuration changes go through methods that
/// keep the context consistent with the new limits, so no mutable access to the raw
/// configuration is offered.
#[derive(Copy, Clone, Debug)]
pub struct PidController<I, F> {
    ctx: PidContext<I, F>,
    controller: FuncPidController<F>,
}

impl<I: InstantLike, F: Float> PidController<I, F> {
    /// Creates a controller taking over a process settled at `output`. See `PidContext::new`.
    pub fn new(config: PidConfig<F>, timestamp: I, output: F) -> Self {
        let controller = FuncPidController::new(config);
        let ctx = controller.reclamp(PidContext::new(timestamp, output));
        Self { ctx, controller }
    }

    /// Creates a controller with zero state
    pub fn new_uninit(config: PidConfig<F>) -> Self {
        Self {
            ctx: PidContext::new_uninit(),
            controller: FuncPidController::new(config),
        }
    }

    /// Returns the configuration
    pub fn config(&self) -> &PidConfig<F> {
        &self.controller.config
    }

    /// Replaces the configuration. Takes effect at the next `compute`.
    pub fn set_config(&mut self, config: PidConfig<F>) {
        self.controller.config = config;
        self.ctx = self.controller.reclamp(self.ctx);
    }

    /// Computes the control output. See `FuncPidController::compute`.
    pub fn compute(&mut self, measurement: F, now: I) -> F {
        let (output, ctx) = self.controller.compute(self.ctx, measurement, now);
        self.ctx = ctx;
        output
    }

    /// Most recently applied output
    pub fn output(&self) -> F {
        self.ctx.output()
    }

    /// Error seen at the last evaluation
    pub fn error(&self) -> F {
        self.ctx.error()
    }

    /// Accumulated integral term
    pub fn integrator(&self) -> F {
        self.ctx.integrator()
    }

    /// Timestamp of the last evaluation
    pub fn last_time(&self) -> Option<I> {
        self.ctx.last_time()
    }

    /// Current operating mode
    pub fn mode(&self) -> ControlMode {
        self.ctx.mode()
    }

    /// Switches the operating mode. See `FuncPidController::set_mode`.
    pub fn set_mode(&mut self, mode: ControlMode) {
        self.ctx = self.controller.set_mode(self.ctx, mode);
    }

    /// Records an externally applied output and returns it after clamping.
    pub fn set_manual_output(&mut self, output: F) -> F {
        self.ctx = self.controller.set_manual_output(self.ctx, output);
        self.ctx.output()
    }

    /// Sets the gains.
    pub fn set_gains(&mut self, kp: F, ki: F, kd: F) -> Result<(), PidConfigError> {
        self.controller.config.set_gains(kp, ki, kd)
    }

    /// Sets the setpoint.
    pub fn set_setpoint(&mut self, setpoint: F) -> Result<(), PidConfigError> {
        self.controller.config.set_setpoint(setpoint)
    }

    /// Sets the output limits and immediately re-clamps the held output.
    pub fn set_output_limits(&mut self, output_min: F, output_max: F) -> Result<(), PidConfigError> {
        self.controller
            .config
            .set_output_limits(output_min, output_max)?;
        self.ctx = self.controller.reclamp(self.ctx);
        Ok(())
    }

    /// Applies a partial parameter update atomically and re-clamps the held output.
    pub fn apply(&mut self, update: &ParamUpdate<F>) -> Result<(), PidConfigError> {
        self.controller.config.apply(update)?;
        self.ctx = self.controller.reclamp(self.ctx);
        Ok(())
    }
}

fn secs<F: Float>(duration: Duration) -> F {
    lit(duration.as_secs_f64())
}

fn lit<F: Float>(value: f64) -> F {
    num_traits::cast(value).unwrap_or_else(F::nan)
}
