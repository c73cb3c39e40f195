//! Hardware Resource Management
//!
//! Assigns the board's pins to the tasks using them. Every group is owned by
//! exactly one task, so nothing here needs a lock.
//!
//! # Resource Groups
//! - Distance Sensor: HC-SR04 trigger and echo pins
//! - Operator Button: push button for recalibration and pause
//!
//! The pin numbers match `sonar_sentry::config::DEFAULT_TRIGGER_PIN` and
//! `DEFAULT_ECHO_PIN`.

use assign_resources::assign_resources;
use embassy_rp::peripherals;

assign_resources! {
    /// HC-SR04 ultrasonic distance sensor pins
    us_distance_sensor: UltrasonicDistanceSensorResources {
       trigger_pin: PIN_15,
       // 5V echo, behind a voltage divider
       echo_pin: PIN_14,
    },
    /// Operator push button, active high
    operator_button: OperatorButtonResources {
        btn: PIN_16,
    },
}
