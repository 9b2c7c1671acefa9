//! Auto-tunes a simulated thermal zone, then holds it at its setpoint
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

use std::error::Error;

use tracing_subscriber::EnvFilter;

use autotune_pid::config::ControllerConfig;
use autotune_pid::driver::ControlLoop;
use autotune_pid::sim::{FirstOrderPlant, SimulatedProcess};
use autotune_pid::time::{Clock, SimulatedClock};

const CONFIG: &str = r#"{
    "controller_id": "urn:ngsi-ld:Controller:001",
    "process_variable": "urn:ngsi-ld:ThermalZone:001/temperature",
    "actuator": "urn:ngsi-ld:Heater:001",
    "command": "heatingPower",
    "actuator_feedback": "heatingPower_info",
    "sample_period": 0.5,
    "params": {
        "Kp": 1.0,
        "Ki": 0.01,
        "Kd": 0.0,
        "lim_low": 0.0,
        "lim_high": 100.0,
        "setpoint": 50.0
    },
    "tuning": {
        "base_output": 10.0,
        "step": 10.0,
        "stable_time": 60.0
    }
}"#;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config: ControllerConfig = serde_json::from_str(CONFIG)?;
    let controller_id = config.controller_id.clone();

    // A zone at 20 °C gaining 2 °C per % of heating power, with a 5 s lag and 1 s dead time,
    // settled at 40 °C under the experiment's base output
    let clock = SimulatedClock::default();
    let plant = FirstOrderPlant::new(2.0, 5.0, 1.0, 20.0, 0.0).settled(10.0);
    let process = SimulatedProcess::new(
        clock.clone(),
        plant,
        config.process_variable.clone(),
        config.actuator.clone(),
    )
    .with_feedback("heatingPower_info");

    let (mut driver, _updates) =
        ControlLoop::with_pid(config, clock.clone(), process.collaborators())?;
    let summary = driver.run_cycles(600)?;

    println!("simulated time: {:.1} s", clock.now().as_secs_f64());
    println!(
        "cycles: {}, overruns: {}, held: {}",
        summary.cycles, summary.overruns, summary.held
    );
    if let Some(params) = process.params(&controller_id) {
        println!(
            "tuned gains: Kp = {:.4}, Ki = {:.4}, Kd = {:.4}",
            params.kp, params.ki, params.kd
        );
    }
    println!(
        "temperature: {:.3} (setpoint 50), heating power: {:?}",
        process.value(),
        process.last_command()
    );
    Ok(())
}
