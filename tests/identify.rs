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

use approx::assert_relative_eq;

use autotune_pid::identify::{identify, StepResponse, StepResponseSample};
use autotune_pid::tuning::TuningError;

/// Samples of the reference step response: the step is applied at t = 1 s
const REFERENCE: [(f64, f64); 6] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (2.0, 5.0),
    (3.0, 9.0),
    (4.0, 10.0),
    (5.0, 10.0),
];

mod test_step_response {
    use super::*;

    #[test]
    fn test_slopes_are_backward_differences() {
        let response = StepResponse::from_samples(REFERENCE).unwrap();
        assert_eq!(response.len(), 6);
        assert_eq!(response.slopes(), vec![0.0, 0.0, 5.0, 4.0, 1.0, 0.0]);
    }

    #[test]
    fn test_duplicate_timestamps_keep_first() {
        let samples = [
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 42.0),
            (2.0, 5.0),
            (2.0, -1.0),
        ];
        let response = StepResponse::from_samples(samples).unwrap();
        assert_eq!(
            response.samples(),
            &[
                StepResponseSample::new(0.0, 0.0),
                StepResponseSample::new(1.0, 0.0),
                StepResponseSample::new(2.0, 5.0),
            ]
        );
    }

    #[test]
    fn test_unordered_input_is_sorted() {
        let mut samples = REFERENCE;
        samples.reverse();
        let response = StepResponse::from_samples(samples).unwrap();
        let ordered = StepResponse::from_samples(REFERENCE).unwrap();
        assert_eq!(response, ordered);
    }

    #[test]
    fn test_non_finite_samples_are_dropped() {
        let samples = [
            (0.0, 0.0),
            (0.5, f64::NAN),
            (f64::INFINITY, 3.0),
            (1.0, 2.0),
        ];
        let response = StepResponse::from_samples(samples).unwrap();
        assert_eq!(response.len(), 2);
    }

    #[test]
    fn test_insufficient_data() {
        let empty: [(f64, f64); 0] = [];
        assert_eq!(
            StepResponse::from_samples(empty),
            Err(TuningError::InsufficientData { distinct: 0 })
        );
        assert_eq!(
            StepResponse::from_samples([(1.0, 0.0), (1.0, 5.0)]),
            Err(TuningError::InsufficientData { distinct: 1 })
        );
    }
}

mod test_identify {
    use super::*;

    #[test]
    fn test_reference_response() {
        let response = StepResponse::from_samples(REFERENCE).unwrap();
        let model = identify(&response, 1.0, Duration::from_secs(1)).unwrap();

        assert_relative_eq!(model.static_gain(), 10.0);
        assert_relative_eq!(model.velocity_gain(), 5.0);
        assert_relative_eq!(model.dead_time(), 0.0);
        assert_relative_eq!(model.time_constant(), 1.0);
    }

    #[test]
    fn test_gains_scale_with_step() {
        let response = StepResponse::from_samples(REFERENCE).unwrap();
        let model = identify(&response, 2.0, Duration::from_secs(1)).unwrap();

        assert_relative_eq!(model.static_gain(), 5.0);
        assert_relative_eq!(model.velocity_gain(), 2.5);
        // Timing does not depend on the size of the step
        assert_relative_eq!(model.time_constant(), 1.0);
    }

    #[test]
    fn test_flat_response_is_degenerate() {
        let response = StepResponse::from_samples([(0.0, 3.0), (1.0, 3.0), (2.0, 3.0)]).unwrap();
        assert_eq!(
            identify(&response, 1.0, Duration::from_secs(1)),
            Err(TuningError::DegenerateResponse)
        );
    }

    #[test]
    fn test_zero_step_is_rejected() {
        let response = StepResponse::from_samples(REFERENCE).unwrap();
        for step in [0.0, f64::NAN] {
            assert_eq!(
                identify(&response, step, Duration::from_secs(1)),
                Err(TuningError::InvalidStep)
            );
        }
    }

    /// Noiseless response of T·y' = 20 + K·u(t − L) − y to u = 10, stepped to 20 after 60 s
    fn fopdt_response(gain: f64, time_constant: f64, dead_time: f64) -> Vec<(f64, f64)> {
        const STABLE_TIME: f64 = 60.0;
        (0..=1200)
            .map(|i| {
                let t = i as f64 * 0.1;
                let mut y = 20.0;
                if t > dead_time {
                    y += gain * 10.0 * (1.0 - (-(t - dead_time) / time_constant).exp());
                }
                if t > STABLE_TIME + dead_time {
                    y += gain
                        * 10.0
                        * (1.0 - (-(t - STABLE_TIME - dead_time) / time_constant).exp());
                }
                (t, y)
            })
            .collect()
    }

    #[test]
    fn test_fopdt_round_trip() {
        let response = StepResponse::from_samples(fopdt_response(2.0, 5.0, 1.0)).unwrap();
        let model = identify(&response, 10.0, Duration::from_secs(60)).unwrap();

        assert_relative_eq!(model.static_gain(), 2.0, epsilon = 1e-3);
        assert_relative_eq!(model.dead_time(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(model.time_constant(), 5.0, epsilon = 1e-3);
        // Steepest slope of a first-order lag is K·Δu/T, sampled slightly late
        assert_relative_eq!(model.velocity_gain(), 2.0 / 5.0, epsilon = 1e-2);
    }
}
