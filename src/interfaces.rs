// Collaborator interfaces between the control loop and the outside world
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

//! Concrete transports (HTTP clients of an entity/attribute store, a time-series history
//! service, an identity provider) implement these traits outside this crate.

use thiserror::Error;

use crate::auth::BearerToken;
use crate::identify::StepResponseSample;
use crate::params::{ControllerParams, ParamUpdate};

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The referenced entity or attribute does not exist upstream. Recoverable: the loop holds
    /// its output and retries on the next cycle.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other transport failure. Fatal for the control loop.
    #[error("transport failure: {0}")]
    Failure(String),
}

impl TransportError {
    /// Whether the error is the recoverable `NotFound` kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Reads the measured process variable
pub trait MeasurementSource {
    /// Reads the current value of `process_variable`
    fn read(&mut self, process_variable: &str) -> Result<f64, TransportError>;

    /// Hands over a fresh bearer token before the next remote call
    fn authorize(&mut self, _token: &BearerToken) {}
}

/// Forwards commands to the actuator
pub trait CommandSink {
    /// Sends `value` as `command` to `actuator`
    fn write(&mut self, actuator: &str, command: &str, value: f64) -> Result<(), TransportError>;

    /// Hands over a fresh bearer token before the next remote call
    fn authorize(&mut self, _token: &BearerToken) {}
}

/// Stores the externally editable controller parameters
pub trait ParameterStore {
    /// Reads the full parameter set of `controller`
    fn read_params(&mut self, controller: &str) -> Result<ControllerParams, TransportError>;

    /// Writes the fields present in `update`
    fn write_params(
        &mut self,
        controller: &str,
        update: &ParamUpdate<f64>,
    ) -> Result<(), TransportError>;

    /// Hands over a fresh bearer token before the next remote call
    fn authorize(&mut self, _token: &BearerToken) {}
}

/// Serves recorded time series
pub trait HistoryService<I> {
    /// Returns the samples of `series` recorded between `from` and `to`, oldest first
    fn query(
        &mut self,
        series: &str,
        from: I,
        to: I,
    ) -> Result<Vec<StepResponseSample>, TransportError>;

    /// Hands over a fresh bearer token before the next remote call
    fn authorize(&mut self, _token: &BearerToken) {}
}
