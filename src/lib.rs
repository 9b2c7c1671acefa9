#![warn(missing_docs)]

//! # Auto-tuning PID Process Controller
//!
//! This library provides a discrete PID controller together with everything needed to run it as
//! a closed-loop process controller against a remote entity/attribute store, and to tune it
//! automatically from an open-loop step response.
//!
//! ## Features
//!
//! - A discrete PID engine generic over the float type and the timestamp type:
//!   - Validated gains, setpoint and output limits; runtime changes are atomic.
//!   - Anti reset-windup by back-solving the integrator whenever the output saturates.
//!   - Reverse action for plants where more output means a lower measurement.
//!   - Bumpless manual/automatic transfer and no derivative kick on the first evaluation.
//!   - Integration over measured intervals, or over a fixed interval.
//!
//! - Step-response auto-tuning:
//!   - Open-loop step experiment with cancellation and timeout.
//!   - First-order-plus-dead-time identification from irregular, duplicated samples.
//!   - Hägglund's piecewise PI rules or the Chien–Hrones–Reswick P/PI/PID rules.
//!
//! - A single-threaded control loop that holds its output while upstream data is missing,
//!   picks up parameter edits between cycles and reports overruns.
//!
//! ## Usage
//!
//! ### Functional PID Controller
//!
//! The functional PID controller lets you explicitly manage the state of the controller. The
//! `compute` method is pure: it takes a context and returns the updated one.
//!
//! ```rust
//! use autotune_pid::pid::{FuncPidController, PidConfigBuilder, PidContext};
//! use autotune_pid::time::Millis;
//!
//! let config = PidConfigBuilder::default()
//!     .kp(1.0)
//!     .ki(0.5)
//!     .setpoint(1.0)
//!     .build()
//!     .expect("Invalid PID config");
//! let pid = FuncPidController::new(config);
//! let ctx = PidContext::<Millis, f64>::new_uninit();
//!
//! // The first evaluation has no interval to integrate over
//! let (output, ctx) = pid.compute(ctx, 0.0, Millis(0));
//! assert_eq!(output, 1.0);
//!
//! let (output, _ctx) = pid.compute(ctx, 0.0, Millis(1000));
//! assert_eq!(output, 1.5);
//! ```
//!
//! ### Stateful PID Controller
//!
//! The stateful PID controller manages a `PidContext` internally and keeps it consistent with
//! configuration changes, e.g. by re-clamping the held output when the limits shrink.
//!
//! ```rust
//! use autotune_pid::pid::{PidConfigBuilder, PidController};
//! use autotune_pid::time::Millis;
//!
//! let config = PidConfigBuilder::default()
//!     .kp(2.0)
//!     .ki(0.0)
//!     .setpoint(10.0)
//!     .output_limits(0.0, 100.0)
//!     .build()
//!     .expect("Invalid PID config");
//! let mut pid = PidController::new_uninit(config);
//!
//! let output = pid.compute(8.5, Millis(0));
//! assert_eq!(output, 3.0);
//!
//! pid.set_output_limits(0.0, 2.0).expect("Invalid limits");
//! assert_eq!(pid.output(), 2.0);
//! ```
//!
//! ### Tuning from a step response
//!
//! ```rust
//! use core::time::Duration;
//!
//! use autotune_pid::identify::{identify, StepResponse};
//! use autotune_pid::tuning::TuningLaw;
//!
//! # fn main() -> Result<(), autotune_pid::tuning::TuningError> {
//! let response = StepResponse::from_samples([
//!     (0.0, 0.0),
//!     (1.0, 0.0),
//!     (2.0, 0.0),
//!     (3.0, 1.0),
//!     (4.0, 5.0),
//!     (5.0, 8.0),
//!     (6.0, 9.5),
//!     (7.0, 10.0),
//! ])?;
//! let model = identify(&response, 1.0, Duration::from_secs(1))?;
//! assert_eq!(model.static_gain(), 10.0);
//!
//! let gains = TuningLaw::Piecewise.gains(&model)?;
//! assert!(gains.kp > 0.0 && gains.ki > 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! MIT

/// The PID engine: configuration, state and the functional and stateful controllers.
pub mod pid;

/// The module containing time-related utilities to support sampling time handling
pub mod time;

/// Runtime parameter sets and the queue carrying edits to the control loop.
pub mod params;

/// Traits of the remote collaborators of a control loop.
pub mod interfaces;

/// Access tokens for secured deployments.
pub mod auth;

/// Process identification from a step response.
pub mod identify;

/// Tuning laws turning a process model into gains.
pub mod tuning;

/// The open-loop step experiment.
pub mod recorder;

/// Deserializable controller configuration.
pub mod config;

/// The control loop.
pub mod driver;

/// Simulated plants and collaborators.
pub mod sim;
