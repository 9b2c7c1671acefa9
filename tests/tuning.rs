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

use approx::assert_relative_eq;

use autotune_pid::config::ConfigError;
use autotune_pid::identify::ProcessModel;
use autotune_pid::params::ParamUpdate;
use autotune_pid::tuning::{
    classical, gain_regime, integral_regime, piecewise, Regime, TunedGains, TuningError,
    TuningLaw, TuningMode,
};

mod test_piecewise_law {
    use super::*;

    #[test]
    fn test_short_dead_time() {
        let model = ProcessModel::new(2.0, 0.4, 0.5, 10.0);
        assert_eq!(gain_regime(&model), Regime::ShortDeadTime);
        assert_eq!(integral_regime(&model), Regime::ShortDeadTime);

        let gains = piecewise(&model).unwrap();
        assert_relative_eq!(gains.kp, 0.35 / (0.4 * 0.5) - 0.6 / 2.0, epsilon = 1e-12);
        assert_relative_eq!(gains.ki, gains.kp / (7.0 * 0.5), epsilon = 1e-12);
        assert_eq!(gains.kd, 0.0);
    }

    #[test]
    fn test_dead_time_at_sixth_of_time_constant_is_balanced() {
        // L == T/6 fails the strict short-dead-time test
        let model = ProcessModel::new(1.0, 1.0, 1.0, 6.0);
        assert_eq!(gain_regime(&model), Regime::Balanced);
        assert_eq!(integral_regime(&model), Regime::Balanced);

        let gains = piecewise(&model).unwrap();
        assert_relative_eq!(gains.kp, 1.5, epsilon = 1e-12);
        assert_relative_eq!(gains.ki, 1.5 / 4.8, epsilon = 1e-12);
    }

    #[test]
    fn test_regimes_are_chosen_independently() {
        // Short for the integral time (L < 0.11 T) requires more than short for the gain
        let model = ProcessModel::new(1.0, 1.0, 1.0, 7.0);
        assert_eq!(gain_regime(&model), Regime::ShortDeadTime);
        assert_eq!(integral_regime(&model), Regime::Balanced);
    }

    #[test]
    fn test_long_dead_time() {
        let model = ProcessModel::new(2.0, 0.1, 4.0, 2.0);
        assert_eq!(gain_regime(&model), Regime::LongDeadTime);
        assert_eq!(integral_regime(&model), Regime::LongDeadTime);

        let gains = piecewise(&model).unwrap();
        assert_relative_eq!(gains.kp, 0.1, epsilon = 1e-12);
        assert_relative_eq!(gains.ki, 0.1 / 2.2, epsilon = 1e-12);
    }

    #[test]
    fn test_dead_time_equal_to_time_constant_falls_back() {
        let model = ProcessModel::new(2.0, 0.5, 3.0, 3.0);
        assert_eq!(gain_regime(&model), Regime::Unmatched);
        assert_eq!(integral_regime(&model), Regime::Unmatched);

        let gains = piecewise(&model).unwrap();
        assert_eq!(gains.kp, 1.0);
        assert_relative_eq!(gains.ki, 1e-6, epsilon = 1e-18);
        assert_eq!(gains.kd, 0.0);
    }

    #[test]
    fn test_reference_model_is_inapplicable() {
        // K = 10, Kv = 5, L = 0, T = 1: no dead time to tune against
        let model = ProcessModel::new(10.0, 5.0, 0.0, 1.0);
        assert!(matches!(
            piecewise(&model),
            Err(TuningError::InapplicableModel(_))
        ));
        assert!(matches!(
            classical(&model, TuningMode::PI),
            Err(TuningError::InapplicableModel(_))
        ));
    }

    #[test]
    fn test_degenerate_models_are_inapplicable() {
        let models = [
            ProcessModel::new(0.0, 1.0, 1.0, 5.0),
            ProcessModel::new(1.0, 1.0, 1.0, -5.0),
            ProcessModel::new(f64::NAN, 1.0, 1.0, 5.0),
            ProcessModel::new(1.0, 1.0, f64::INFINITY, 5.0),
        ];
        for model in models {
            assert!(matches!(
                piecewise(&model),
                Err(TuningError::InapplicableModel(_))
            ));
        }
    }
}

mod test_classical_law {
    use super::*;

    fn model() -> ProcessModel {
        ProcessModel::new(2.0, 0.4, 1.0, 5.0)
    }

    #[test]
    fn test_p() {
        let gains = classical(&model(), TuningMode::P).unwrap();
        assert_relative_eq!(gains.kp, 0.75, epsilon = 1e-12);
        assert_eq!(gains.ki, 0.0);
        assert_eq!(gains.kd, 0.0);
    }

    #[test]
    fn test_pi() {
        let gains = classical(&model(), TuningMode::PI).unwrap();
        assert_relative_eq!(gains.kp, 0.875, epsilon = 1e-12);
        assert_relative_eq!(gains.ki, 0.875 / 1.2, epsilon = 1e-12);
        assert_eq!(gains.kd, 0.0);
    }

    #[test]
    fn test_pid() {
        let gains = classical(&model(), TuningMode::PID).unwrap();
        assert_relative_eq!(gains.kp, 1.5, epsilon = 1e-12);
        assert_relative_eq!(gains.ki, 1.5, epsilon = 1e-12);
        assert_relative_eq!(gains.kd, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_requires_dead_time_below_third_of_time_constant() {
        let model = ProcessModel::new(2.0, 0.4, 1.0, 3.0);
        for mode in [TuningMode::P, TuningMode::PI, TuningMode::PID] {
            assert!(matches!(
                classical(&model, mode),
                Err(TuningError::InapplicableModel(_))
            ));
        }
    }

    #[test]
    fn test_law_dispatch() {
        let model = model();
        assert_eq!(
            TuningLaw::Classical(TuningMode::PID).gains(&model),
            classical(&model, TuningMode::PID)
        );
        assert_eq!(TuningLaw::Piecewise.gains(&model), piecewise(&model));
        assert_eq!(TuningLaw::default(), TuningLaw::Piecewise);
    }
}

mod test_tuning_mode {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for mode in [TuningMode::P, TuningMode::PI, TuningMode::PID] {
            assert_eq!(mode.to_string().parse::<TuningMode>(), Ok(mode));
        }
        assert_eq!(TuningMode::default(), TuningMode::PI);
    }

    #[test]
    fn test_unknown_mode() {
        assert_eq!(
            "PD".parse::<TuningMode>(),
            Err(ConfigError::InvalidTuningMode("PD".to_owned()))
        );
        assert!("pi".parse::<TuningMode>().is_err());
    }

    #[test]
    fn test_law_from_json() {
        let law: TuningLaw = serde_json::from_str(r#""piecewise""#).unwrap();
        assert_eq!(law, TuningLaw::Piecewise);

        let law: TuningLaw = serde_json::from_str(r#"{"classical": "PID"}"#).unwrap();
        assert_eq!(law, TuningLaw::Classical(TuningMode::PID));

        assert_eq!(serde_json::to_string(&TuningMode::PI).unwrap(), r#""PI""#);

        // Unknown modes are rejected through the same parser as `FromStr`
        let err = serde_json::from_str::<TuningLaw>(r#"{"classical": "PD"}"#).unwrap_err();
        assert!(err.to_string().starts_with(r#"invalid tuning mode "PD""#));
    }

    #[test]
    fn test_gains_become_update() {
        let update = ParamUpdate::from(TunedGains {
            kp: 1.0,
            ki: 0.5,
            kd: 0.0,
        });
        assert_eq!(update, ParamUpdate::gains(1.0, 0.5, 0.0));
        assert_eq!(update.setpoint, None);
    }
}
