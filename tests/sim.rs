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


mod test_first_order_plant {
    use super::fixtures::test_process::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_rests_at_baseline_without_input() {
        let mut plant = make_plant();
        plant.advance(10.0);
        assert_eq!(plant.value(), 20.0);
        assert_relative_eq!(plant.time(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_step_response_after_dead_time() {
        let mut plant = make_plant();
        plant.set_input(10.0);

        // Nothing happens during the dead time
        plant.advance(1.0);
        assert_eq!(plant.value(), 20.0);

        // One time constant later, 63 % of the final change
        plant.advance(5.0);
        assert_relative_eq!(
            plant.value(),
            20.0 + 2.0 * 10.0 * (1.0 - (-1.0f64).exp()),
            epsilon = 1e-9
        );

        plant.advance(100.0);
        assert_relative_eq!(plant.value(), 40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_input_changes_are_delayed_individually() {
        let mut plant = make_plant();
        plant.set_input(10.0);
        plant.advance(0.5);
        plant.set_input(0.0);

        // The pulse reaches the output between 1.0 s and 1.5 s only
        plant.advance(1.5);
        let after_pulse = plant.value();
        assert!(after_pulse > 20.0);

        plant.advance(50.0);
        assert_relative_eq!(plant.value(), 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_settled_plant_holds_until_the_input_changes() {
        let mut plant = make_plant().settled(BASE_OUTPUT);
        assert_eq!(plant.value(), 40.0);

        // No transient from the initial input
        plant.advance(60.0);
        assert_eq!(plant.value(), 40.0);

        plant.set_input(20.0);
        plant.advance(1.0);
        assert_eq!(plant.value(), 40.0);
        plant.advance(100.0);
        assert_relative_eq!(plant.value(), 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_non_positive_advance_is_ignored() {
        let mut plant = make_plant();
        plant.set_input(10.0);
        plant.advance(2.0);
        let value = plant.value();

        plant.advance(0.0);
        plant.advance(-1.0);
        assert_eq!(plant.value(), value);
        assert_relative_eq!(plant.time(), 2.0, epsilon = 1e-9);
    }
}

mod test_simulated_process {
    use super::fixtures::test_process::*;

    use core::time::Duration;

    use approx::assert_relative_eq;

    use autotune_pid::interfaces::{
        CommandSink, HistoryService, MeasurementSource, ParameterStore, TransportError,
    };
    use autotune_pid::params::{ControllerParams, ParamUpdate};
    use autotune_pid::time::{Clock, SimulatedClock, TimeF64};

    #[test]
    fn test_history_is_recorded_at_sample_period() {
        let clock = SimulatedClock::default();
        let process = make_process(&clock);

        clock.advance(Duration::from_secs(1));
        let history = process.history();
        assert_eq!(history.len(), 11);
        assert_eq!(history[0].timestamp, 0.0);
        assert_relative_eq!(history[10].timestamp, 1.0, epsilon = 1e-9);

        let slow = make_process(&clock).with_sample_period(Duration::from_millis(500));
        clock.advance(Duration::from_secs(2));
        assert_eq!(slow.history().len(), 5);
    }

    #[test]
    fn test_history_query_window() {
        let clock = SimulatedClock::default();
        let mut process = make_process(&clock);

        assert!(process.write(ACTUATOR, COMMAND, 20.0).is_ok());
        clock.advance(Duration::from_secs(10));

        let window = process
            .query(PROCESS_VARIABLE, TimeF64(2.0), TimeF64(3.0))
            .unwrap();
        assert_eq!(window.len(), 11);
        assert!(window.iter().all(|s| s.timestamp >= 2.0 && s.timestamp <= 3.0));
        // Rising after the dead time
        assert!(window[10].value > window[0].value);

        assert_eq!(
            process.query("urn:ngsi-ld:ThermalZone:002/temperature", TimeF64(0.0), TimeF64(1.0)),
            Err(TransportError::NotFound(
                "urn:ngsi-ld:ThermalZone:002/temperature".to_owned()
            ))
        );
    }

    #[test]
    fn test_commands_drive_the_plant() {
        let clock = SimulatedClock::default();
        let mut process = make_process(&clock);

        assert_eq!(process.read(PROCESS_VARIABLE), Ok(40.0));
        assert!(process.write(ACTUATOR, COMMAND, 20.0).is_ok());
        assert_eq!(process.last_command(), Some(20.0));

        clock.advance(Duration::from_secs(100));
        assert_relative_eq!(process.read(PROCESS_VARIABLE).unwrap(), 60.0, epsilon = 1e-6);

        assert!(matches!(
            process.write("urn:ngsi-ld:Heater:002", COMMAND, 10.0),
            Err(TransportError::NotFound(_))
        ));
    }

    #[test]
    fn test_actuator_feedback() {
        let clock = SimulatedClock::default();
        let mut process = make_process(&clock);

        assert_eq!(
            process.read(FEEDBACK),
            Err(TransportError::NotFound(FEEDBACK.to_owned()))
        );
        assert!(process.write(ACTUATOR, COMMAND, 12.5).is_ok());
        assert_eq!(process.read(FEEDBACK), Ok(12.5));
    }

    #[test]
    fn test_offline_process_variable() {
        let clock = SimulatedClock::default();
        let mut process = make_process(&clock);

        process.set_offline(true);
        assert!(process
            .read(PROCESS_VARIABLE)
            .is_err_and(|err| err.is_not_found()));

        process.set_offline(false);
        assert_eq!(process.read(PROCESS_VARIABLE), Ok(40.0));
    }

    #[test]
    fn test_parameter_store() {
        let clock = SimulatedClock::default();
        let mut process = make_process(&clock);

        assert!(process
            .read_params(CONTROLLER)
            .is_err_and(|err| err.is_not_found()));

        // A partial update cannot create an entry
        assert!(process
            .write_params(CONTROLLER, &ParamUpdate::setpoint(21.0))
            .is_err_and(|err| err.is_not_found()));
        assert_eq!(process.params(CONTROLLER), None);

        let initial = ControllerParams::default();
        assert!(process.write_params(CONTROLLER, &initial.into()).is_ok());
        assert_eq!(process.read_params(CONTROLLER), Ok(initial));

        // Later updates merge into the entry
        assert!(process
            .write_params(CONTROLLER, &ParamUpdate::gains(0.6, 0.15, 0.0))
            .is_ok());
        let stored = process.read_params(CONTROLLER).unwrap();
        assert_eq!((stored.kp, stored.ki, stored.kd), (0.6, 0.15, 0.0));
        assert_eq!(stored.setpoint, initial.setpoint);
    }

    #[test]
    fn test_latency_advances_clock() {
        let clock = SimulatedClock::default();
        let mut process = make_process(&clock).with_latency(Duration::from_millis(200));

        assert!(process.read(PROCESS_VARIABLE).is_ok());
        assert!(process.write(ACTUATOR, COMMAND, 1.0).is_ok());
        assert_relative_eq!(clock.now().as_secs_f64(), 0.4, epsilon = 1e-9);
    }
}

#[cfg(feature = "simulation")]
mod test_mass_spring_damper {
    use core::time::Duration;

    use approx::assert_relative_eq;
    use nalgebra as na;

    use autotune_pid::pid::*;
    use autotune_pid::sim::MassSpringDamper;
    use autotune_pid::time::Millis;

    const STEP_MS: u64 = 10;
    const STEP_S: f64 = STEP_MS as f64 * 0.001;

    fn make_plant() -> MassSpringDamper {
        MassSpringDamper {
            natural_frequency: 2.0 * std::f64::consts::PI,
            damping_ratio: 0.2,
        }
    }

    fn make_config() -> PidConfig<f64> {
        PidConfigBuilder::default()
            .kp(0.5)
            .ki(2.0)
            .kd(0.02)
            .setpoint(1.0)
            .output_limits(-10.0, 10.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_open_loop_static_gain() {
        let plant = make_plant();
        let mut x = na::vector![0.0, 0.0];
        for _ in 0..3000 {
            x = plant.rk4_step(x, 1.0, STEP_S);
        }
        assert_relative_eq!(plant.h(x), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_closed_loop_settles_at_setpoint() {
        let plant = make_plant();
        let mut pid = PidController::new_uninit(make_config());
        let mut x = na::vector![0.0, 0.0];
        let mut now = Millis(0);

        for _ in 0..2000 {
            let u = pid.compute(plant.h(x), now);
            x = plant.rk4_step(x, u, STEP_S);
            now = now + Duration::from_millis(STEP_MS);
        }
        assert_relative_eq!(plant.h(x), 1.0, epsilon = 1e-5);
        assert_relative_eq!(pid.output(), 1.0, epsilon = 1e-5);
    }

    /// The stateful controller forwards to the functional one and must agree with it to the bit
    #[test]
    fn test_stateful_matches_functional_closed_loop() {
        let plant = make_plant();
        let func_pid = FuncPidController::new(make_config());
        let mut ctx = PidContext::<Millis, f64>::new_uninit();
        let mut stateful_pid = PidController::new_uninit(make_config());

        let mut x = na::vector![0.0, 0.0];
        let mut now = Millis(0);
        let mut expected: f64;

        for _ in 0..1000 {
            let y = plant.h(x);
            (expected, ctx) = func_pid.compute(ctx, y, now);
            let result = stateful_pid.compute(y, now);
            assert_eq!(result, expected);

            x = plant.rk4_step(x, expected, STEP_S);
            now = now + Duration::from_millis(STEP_MS);
        }
    }
}
