//! Motion sampling
//!
//! Runs the sonar-sentry pipeline on the HC-SR04.
//!
//! # Sensor Operation
//! - One measurement every 100ms (`Config::default`)
//! - Echo timeout of 30ms covers the 4m maximum range with margin
//! - Fixed ambient temperature of 21.5°C for the speed of sound
//!
//! # Failure Handling
//! - Missing or out-of-range echoes are handled inside the pipeline
//! - An invalid configuration stops the task before the first measurement
//! - A pin failure is fatal: logged, then panic-probe halts the core

use defmt::{error, info};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_time::{Delay, Duration, Timer};
use sonar_sentry::{Config, Hcsr04, Sampler, SystemClock};

use crate::system::event::{COMMANDS, EVENT_QUEUE, STATUS};
use crate::system::resources::UltrasonicDistanceSensorResources;

/// Fixed ambient temperature for distance calculations
/// (a few degrees off shifts readings well below the motion threshold)
const TEMPERATURE: f32 = 21.5;

/// Wait after power-up before the first trigger (the HC-SR04 needs a moment to settle)
const SENSOR_SETTLE_TIME: Duration = Duration::from_millis(500);

/// Sampling task, owns the sensor pins for its whole lifetime
#[embassy_executor::task]
pub async fn sample_motion(r: UltrasonicDistanceSensorResources) {
    let config = Config {
        temperature_celsius: Some(TEMPERATURE),
        ..Config::default()
    };

    let trigger = Output::new(r.trigger_pin, Level::Low);
    let echo = Input::new(r.echo_pin, Pull::None);
    let sensor = Hcsr04::new(trigger, echo, SystemClock, Delay, config.echo_timeout());

    let mut sampler = match Sampler::new(&config, sensor, SystemClock, Delay, &EVENT_QUEUE) {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("invalid sampler configuration: {}", e);
            return;
        }
    };

    Timer::after(SENSOR_SETTLE_TIME).await;
    info!("motion sampling started");

    match sampler.run(&COMMANDS, &STATUS).await {
        Ok(()) => info!("motion sampling shut down"),
        Err(e) => {
            error!("ultrasonic sensor failed: {}", e);
            panic!("ultrasonic sensor failed");
        }
    }
}
