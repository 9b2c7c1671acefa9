// Runtime-tunable controller parameters and the queue that carries their updates
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

use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The full parameter set of a controller as kept by a parameter store. Field names on the wire
/// follow the attribute names of the controller entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerParams {
    /// Proportional gain
    #[serde(rename = "Kp")]
    pub kp: f64,
    /// Integral gain
    #[serde(rename = "Ki")]
    pub ki: f64,
    /// Derivative gain
    #[serde(rename = "Kd")]
    pub kd: f64,
    /// Lower output limit
    #[serde(rename = "lim_low")]
    pub low: f64,
    /// Upper output limit
    #[serde(rename = "lim_high")]
    pub high: f64,
    /// Setpoint
    pub setpoint: f64,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.01,
            kd: 0.0,
            low: 0.0,
            high: 100.0,
            setpoint: 293.15,
        }
    }
}

impl From<ControllerParams> for ParamUpdate<f64> {
    fn from(params: ControllerParams) -> Self {
        Self {
            kp: Some(params.kp),
            ki: Some(params.ki),
            kd: Some(params.kd),
            output_min: Some(params.low),
            output_max: Some(params.high),
            setpoint: Some(params.setpoint),
        }
    }
}

/// A partial change of the externally editable parameters. Absent fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamUpdate<F> {
    /// Proportional gain
    #[serde(rename = "Kp", default, skip_serializing_if = "Option::is_none")]
    pub kp: Option<F>,
    /// Integral gain
    #[serde(rename = "Ki", default, skip_serializing_if = "Option::is_none")]
    pub ki: Option<F>,
    /// Derivative gain
    #[serde(rename = "Kd", default, skip_serializing_if = "Option::is_none")]
    pub kd: Option<F>,
    /// Lower output limit
    #[serde(rename = "lim_low", default, skip_serializing_if = "Option::is_none")]
    pub output_min: Option<F>,
    /// Upper output limit
    #[serde(rename = "lim_high", default, skip_serializing_if = "Option::is_none")]
    pub output_max: Option<F>,
    /// Setpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<F>,
}

impl<F> ParamUpdate<F> {
    /// An update touching only the three gains
    pub fn gains(kp: F, ki: F, kd: F) -> Self {
        Self {
            kp: Some(kp),
            ki: Some(ki),
            kd: Some(kd),
            output_min: None,
            output_max: None,
            setpoint: None,
        }
    }

    /// An update touching only the setpoint
    pub fn setpoint(setpoint: F) -> Self {
        Self {
            kp: None,
            ki: None,
            kd: None,
            output_min: None,
            output_max: None,
            setpoint: Some(setpoint),
        }
    }

    /// An update touching only the output limits
    pub fn output_limits(output_min: F, output_max: F) -> Self {
        Self {
            kp: None,
            ki: None,
            kd: None,
            output_min: Some(output_min),
            output_max: Some(output_max),
            setpoint: None,
        }
    }

    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.kp.is_none()
            && self.ki.is_none()
            && self.kd.is_none()
            && self.output_min.is_none()
            && self.output_max.is_none()
            && self.setpoint.is_none()
    }
}

/// Returned when the control loop owning the receiving end has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parameter queue is closed")]
pub struct ParamQueueClosed;

/// Sending end of the parameter queue. Cheap to clone and safe to move to an editing thread.
#[derive(Debug, Clone)]
pub struct ParamSender {
    tx: Sender<ParamUpdate<f64>>,
}

impl ParamSender {
    /// Queues an update for the next control cycle
    pub fn send(&self, update: ParamUpdate<f64>) -> Result<(), ParamQueueClosed> {
        self.tx.send(update).map_err(|_| ParamQueueClosed)
    }
}

/// Receiving end of the parameter queue, owned by the control loop
#[derive(Debug)]
pub struct ParamReceiver {
    rx: Receiver<ParamUpdate<f64>>,
}

impl ParamReceiver {
    /// Takes every update queued so far, in the order they were sent
    pub fn drain(&self) -> impl Iterator<Item = ParamUpdate<f64>> + '_ {
        self.rx.try_iter()
    }
}

/// Creates the single-writer path through which parameter edits reach the control loop
pub fn param_queue() -> (ParamSender, ParamReceiver) {
    let (tx, rx) = channel::unbounded();
    (ParamSender { tx }, ParamReceiver { rx })
}
