// Empirical tuning laws mapping a process model to PID gains
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

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::identify::ProcessModel;
use crate::interfaces::TransportError;
use crate::params::ParamUpdate;

/// Why an auto-tuning run produced no gains. The controller keeps its previous gains in every
/// case.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuningError {
    /// The history service returned fewer than two distinct samples
    #[error("step response has {distinct} distinct samples, at least 2 are required")]
    InsufficientData {
        /// Number of distinct samples received
        distinct: usize,
    },

    /// The response never rises, so no steepest slope exists
    #[error("step response is flat, no step detected")]
    DegenerateResponse,

    /// The identified model lies outside what the chosen law can handle
    #[error("process model is not applicable: {0}")]
    InapplicableModel(&'static str),

    /// The input step is zero or not finite
    #[error("input step must be non-zero and finite")]
    InvalidStep,

    /// The experiment was cancelled before it completed
    #[error("step experiment cancelled")]
    Cancelled,

    /// The experiment did not complete within its timeout
    #[error("step experiment exceeded its timeout of {0:?}")]
    TimedOut(Duration),

    /// A remote call failed during the experiment
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Controller structure requested from the classical step-response law
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum TuningMode {
    /// Proportional only
    P,
    /// Proportional-integral
    #[default]
    PI,
    /// Proportional-integral-derivative
    PID,
}

impl FromStr for TuningMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(TuningMode::P),
            "PI" => Ok(TuningMode::PI),
            "PID" => Ok(TuningMode::PID),
            other => Err(ConfigError::InvalidTuningMode(other.to_owned())),
        }
    }
}

impl TryFrom<String> for TuningMode {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for TuningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningMode::P => write!(f, "P"),
            TuningMode::PI => write!(f, "PI"),
            TuningMode::PID => write!(f, "PID"),
        }
    }
}

/// The empirical law used to turn a `ProcessModel` into gains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningLaw {
    /// Hägglund's PI rules, chosen piecewise by the ratio of dead time to time constant
    #[default]
    Piecewise,
    /// Chien–Hrones–Reswick rules for reference tracking. Requires `L/T < 1/3`.
    Classical(TuningMode),
}

impl TuningLaw {
    /// Computes gains for `model`
    pub fn gains(&self, model: &ProcessModel) -> Result<TunedGains, TuningError> {
        match self {
            TuningLaw::Piecewise => piecewise(model),
            TuningLaw::Classical(mode) => classical(model, *mode),
        }
    }
}

/// Gains produced by a tuning law
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunedGains {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain, per second
    pub ki: f64,
    /// Derivative gain, in seconds
    pub kd: f64,
}

impl From<TunedGains> for ParamUpdate<f64> {
    fn from(gains: TunedGains) -> Self {
        ParamUpdate::gains(gains.kp, gains.ki, gains.kd)
    }
}

/// Branch of the piecewise law selected for a model. Conditions are tested in declaration order
/// and the first one that holds wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Dead time small against the time constant
    ShortDeadTime,
    /// Dead time below the time constant
    Balanced,
    /// Dead time above the time constant
    LongDeadTime,
    /// No condition holds (dead time equal to the time constant). Falls back to a unity gain
    /// and a practically disabled integral.
    Unmatched,
}

/// Regime selecting the proportional gain: `L < T/6`, `L < T`, `L > T`
pub fn gain_regime(model: &ProcessModel) -> Regime {
    let (l, t) = (model.dead_time(), model.time_constant());
    if l < t / 6.0 {
        Regime::ShortDeadTime
    } else if l < t {
        Regime::Balanced
    } else if l > t {
        Regime::LongDeadTime
    } else {
        Regime::Unmatched
    }
}

/// Regime selecting the integral time: `L < 0.11 T`, `L < T`, `L > T`
pub fn integral_regime(model: &ProcessModel) -> Regime {
    let (l, t) = (model.dead_time(), model.time_constant());
    if l < 0.11 * t {
        Regime::ShortDeadTime
    } else if l < t {
        Regime::Balanced
    } else if l > t {
        Regime::LongDeadTime
    } else {
        Regime::Unmatched
    }
}

/// Hägglund's piecewise PI law. `Kd` is always zero.
pub fn piecewise(model: &ProcessModel) -> Result<TunedGains, TuningError> {
    check_model(model)?;
    let k = model.static_gain();
    let kv = model.velocity_gain();
    let l = model.dead_time();
    let t = model.time_constant();

    let kp = match gain_regime(model) {
        Regime::ShortDeadTime => 0.35 / (kv * l) - 0.6 / k,
        Regime::Balanced => 0.25 * t / (k * l),
        Regime::LongDeadTime => 0.1 * t / (k * l) + 0.15 / k,
        Regime::Unmatched => 1.0,
    };
    let ti = match integral_regime(model) {
        Regime::ShortDeadTime => 7.0 * l,
        Regime::Balanced => 0.8 * t,
        Regime::LongDeadTime => 0.3 * l + 0.5 * t,
        Regime::Unmatched => 1e6,
    };

    finite(TunedGains {
        kp,
        ki: kp / ti,
        kd: 0.0,
    })
}

/// Chien–Hrones–Reswick law, reference-tracking variant without overshoot.
///
/// # Returns
/// - `Err(TuningError::InapplicableModel)` unless `L/T < 1/3`.
pub fn classical(model: &ProcessModel, mode: TuningMode) -> Result<TunedGains, TuningError> {
    check_model(model)?;
    let k = model.static_gain();
    let l = model.dead_time();
    let t = model.time_constant();

    if l / t >= 1.0 / 3.0 {
        return Err(TuningError::InapplicableModel(
            "dead time must be less than a third of the time constant",
        ));
    }

    let gains = match mode {
        TuningMode::P => TunedGains {
            kp: 0.3 * t / (k * l),
            ki: 0.0,
            kd: 0.0,
        },
        TuningMode::PI => {
            let kp = 0.35 * t / (k * l);
            let ti = 1.2 * l;
            TunedGains {
                kp,
                ki: kp / ti,
                kd: 0.0,
            }
        }
        TuningMode::PID => {
            let kp = 0.6 * t / (k * l);
            let ti = l;
            let td = 0.5 * l;
            TunedGains {
                kp,
                ki: kp / ti,
                kd: kp * td,
            }
        }
    };
    finite(gains)
}

fn check_model(model: &ProcessModel) -> Result<(), TuningError> {
    if model.static_gain() == 0.0 || !model.static_gain().is_finite() {
        return Err(TuningError::InapplicableModel(
            "static gain must be non-zero and finite",
        ));
    }
    if !(model.dead_time() > 0.0 && model.dead_time().is_finite()) {
        return Err(TuningError::InapplicableModel(
            "dead time must be positive and finite",
        ));
    }
    if !(model.time_constant() > 0.0 && model.time_constant().is_finite()) {
        return Err(TuningError::InapplicableModel(
            "time constant must be positive and finite",
        ));
    }
    Ok(())
}

fn finite(gains: TunedGains) -> Result<TunedGains, TuningError> {
    if gains.kp.is_finite() && gains.ki.is_finite() && gains.kd.is_finite() {
        Ok(gains)
    } else {
        Err(TuningError::InapplicableModel("law yields non-finite gains"))
    }
}
