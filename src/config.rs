// Controller configuration surface
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

//! Configuration is a plain serde value, built once at start-up by whatever loads it (file,
//! environment, orchestrator). Validation turns it into the typed values the engine and the
//! driver consume. Runtime parameter changes do not go through here; see `params`.

use core::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::ControllerParams;
use crate::pid::{PidConfig, PidConfigBuilder, PidConfigError};
use crate::recorder::StepExperiment;
use crate::tuning::TuningLaw;

/// Shortest control period accepted
pub const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Rejected configuration. Never coerced into something valid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Unknown controller structure for the classical tuning law
    #[error("invalid tuning mode {0:?}, expected one of P, PI, PID")]
    InvalidTuningMode(String),

    /// Control period too short or not a number
    #[error("sample period must be at least {MIN_SAMPLE_PERIOD:?}, got {0} s")]
    InvalidSamplePeriod(f64),

    /// A duration field is negative, zero or not finite
    #[error("{field} must be a positive number of seconds, got {value}")]
    InvalidDuration {
        /// Name of the offending field
        field: &'static str,
        /// Value found
        value: f64,
    },

    /// Tuning step is zero or not finite
    #[error("tuning step must be non-zero and finite, got {0}")]
    InvalidStep(f64),

    /// Base output of the step experiment is not finite
    #[error("tuning base output must be finite, got {0}")]
    InvalidBaseOutput(f64),

    /// Initial engine parameters are invalid
    #[error(transparent)]
    Pid(#[from] PidConfigError),
}

/// Everything needed to start one controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Id of the controller entity holding the editable parameters
    pub controller_id: String,
    /// Id of the measured process variable
    pub process_variable: String,
    /// Id of the actuator receiving commands
    pub actuator: String,
    /// Name of the command carrying the output
    pub command: String,
    /// Attribute reporting the actuator's current value, read to warm-start the engine after a
    /// pause
    #[serde(default)]
    pub actuator_feedback: Option<String>,
    /// Control period in seconds
    #[serde(default = "default_sample_period")]
    pub sample_period: f64,
    /// Fixed integration interval in seconds; measured between cycles if absent
    #[serde(default)]
    pub fixed_interval: Option<f64>,
    /// Negate the control error
    #[serde(default)]
    pub reverse_action: bool,
    /// Initial gains, limits and setpoint
    #[serde(default)]
    pub params: ControllerParams,
    /// Auto-tune before entering steady control
    #[serde(default)]
    pub tuning: Option<TuningConfig>,
    /// Renew the access token once it is valid for fewer seconds than this
    #[serde(default = "default_token_min_validity")]
    pub token_min_validity: f64,
}

/// Step experiment and tuning law of an auto-tuning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    /// Output applied while the process settles
    pub base_output: f64,
    /// Output step applied after settling
    pub step: f64,
    /// Settling time of each phase, in seconds
    pub stable_time: f64,
    /// Tuning law and, for the classical law, controller structure
    #[serde(default)]
    pub law: TuningLaw,
    /// History series to query; the process variable id if absent
    #[serde(default)]
    pub series: Option<String>,
    /// Abort the experiment after this many seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

fn default_sample_period() -> f64 {
    0.5
}

fn default_token_min_validity() -> f64 {
    60.0
}

fn positive_secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value > 0.0 {
        if let Ok(duration) = Duration::try_from_secs_f64(value) {
            return Ok(duration);
        }
    }
    Err(ConfigError::InvalidDuration { field, value })
}

impl ControllerConfig {
    /// Creates a configuration with default timing and parameters
    pub fn new(
        controller_id: impl Into<String>,
        process_variable: impl Into<String>,
        actuator: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            controller_id: controller_id.into(),
            process_variable: process_variable.into(),
            actuator: actuator.into(),
            command: command.into(),
            actuator_feedback: None,
            sample_period: default_sample_period(),
            fixed_interval: None,
            reverse_action: false,
            params: ControllerParams::default(),
            tuning: None,
            token_min_validity: default_token_min_validity(),
        }
    }

    /// Checks every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.period()?;
        self.pid_config()?;
        self.token_min_validity()?;
        if let Some(tuning) = &self.tuning {
            tuning.experiment()?;
        }
        Ok(())
    }

    /// Control period
    pub fn period(&self) -> Result<Duration, ConfigError> {
        match Duration::try_from_secs_f64(self.sample_period) {
            Ok(period) if period >= MIN_SAMPLE_PERIOD => Ok(period),
            _ => Err(ConfigError::InvalidSamplePeriod(self.sample_period)),
        }
    }

    /// Initial engine configuration
    pub fn pid_config(&self) -> Result<PidConfig<f64>, ConfigError> {
        let params = &self.params;
        let mut builder = PidConfigBuilder::default()
            .kp(params.kp)
            .ki(params.ki)
            .kd(params.kd)
            .output_limits(params.low, params.high)
            .setpoint(params.setpoint)
            .reverse_action(self.reverse_action);
        if let Some(interval) = self.fixed_interval {
            builder = builder.fixed_interval(positive_secs("fixed_interval", interval)?);
        }
        Ok(builder.build()?)
    }

    /// Token renewal threshold
    pub fn token_min_validity(&self) -> Result<TimeDelta, ConfigError> {
        let duration = positive_secs("token_min_validity", self.token_min_validity)?;
        TimeDelta::from_std(duration).map_err(|_| ConfigError::InvalidDuration {
            field: "token_min_validity",
            value: self.token_min_validity,
        })
    }

    /// History series recorded during tuning
    pub fn tuning_series(&self) -> &str {
        self.tuning
            .as_ref()
            .and_then(|t| t.series.as_deref())
            .unwrap_or(&self.process_variable)
    }
}

impl TuningConfig {
    /// The step experiment described by this configuration
    pub fn experiment(&self) -> Result<StepExperiment, ConfigError> {
        if !self.base_output.is_finite() {
            return Err(ConfigError::InvalidBaseOutput(self.base_output));
        }
        if self.step == 0.0 || !self.step.is_finite() {
            return Err(ConfigError::InvalidStep(self.step));
        }
        let stable_time = positive_secs("stable_time", self.stable_time)?;
        let timeout = self
            .timeout
            .map(|it| positive_secs("timeout", it))
            .transpose()?;
        Ok(StepExperiment {
            base_output: self.base_output,
            step: self.step,
            stable_time,
            timeout,
        })
    }
}
