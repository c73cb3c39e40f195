//! Echo time to distance conversion
//!
//! ```text
//! distance_cm = echo_us * speed_of_sound_cm_per_us / 2
//! ```
//! The division by two accounts for the round trip.
//!
//! # Speed of Sound
//! - Defaults to 343 m/s (dry air at ~20°C)
//! - With a known ambient temperature: `331.3 + 0.606 * T` m/s
//! - A few degrees of error shift readings by well under 1%, which the motion
//!   threshold absorbs
//!
//! # Range Validation
//! Distances outside `[min_range_cm, max_range_cm]` become invalid samples.
//! They are never clamped, so a broken echo cannot pass for a real reading.

use embassy_time::Instant;

use crate::config::{check_temperature, Config};
use crate::error::{ConfigError, SampleError};
use crate::pulse::{Echo, RawPulse};

/// Speed of sound at ~20°C, in cm/µs
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;

/// Speed of sound for an optional ambient temperature, in cm/µs
pub fn speed_of_sound_cm_per_us(temperature_celsius: Option<f32>) -> f32 {
    match temperature_celsius {
        // m/s -> cm/µs
        Some(celsius) => (331.3 + 0.606 * celsius) / 10_000.0,
        None => SPEED_OF_SOUND_CM_PER_US,
    }
}

/// One converted measurement
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// When the trigger pulse ended
    pub timestamp: Instant,
    /// Distance in cm, or why there is none
    pub distance: Result<f32, SampleError>,
}

impl Sample {
    /// Distance in cm if the sample is valid
    pub fn distance_cm(&self) -> Option<f32> {
        self.distance.ok()
    }

    /// Whether the sample carries a distance
    pub fn is_valid(&self) -> bool {
        self.distance.is_ok()
    }
}

/// Converts raw pulses into range-checked samples
#[derive(Debug, Clone)]
pub struct DistanceConverter {
    speed_of_sound: f32,
    min_range_cm: f32,
    max_range_cm: f32,
}

impl DistanceConverter {
    /// Converter for the configured range and temperature
    pub fn new(config: &Config) -> Self {
        Self {
            speed_of_sound: config.speed_of_sound(),
            min_range_cm: config.min_range_cm,
            max_range_cm: config.max_range_cm,
        }
    }

    /// Updates the ambient temperature, e.g. from an external sensor.
    /// `None` returns to the fixed default. A temperature outside the operating
    /// range is rejected and the previous speed of sound stays in use.
    pub fn set_temperature(&mut self, temperature_celsius: Option<f32>) -> Result<(), ConfigError> {
        check_temperature(temperature_celsius)?;
        self.speed_of_sound = speed_of_sound_cm_per_us(temperature_celsius);
        Ok(())
    }

    /// Speed of sound in use, in cm/µs
    pub fn speed_of_sound(&self) -> f32 {
        self.speed_of_sound
    }

    /// Converts a pulse. Timeouts and out-of-range echoes become invalid samples.
    pub fn convert(&self, pulse: RawPulse) -> Sample {
        let distance = match pulse.echo {
            Echo::Timeout => {
                debug!("echo timeout");
                Err(SampleError::Timeout)
            }
            Echo::Received(duration) => {
                let distance_cm = duration.as_micros() as f32 * self.speed_of_sound / 2.0;
                if (self.min_range_cm..=self.max_range_cm).contains(&distance_cm) {
                    Ok(distance_cm)
                } else {
                    debug!("echo out of range: {} cm", distance_cm);
                    Err(SampleError::OutOfRange { distance_cm })
                }
            }
        };

        Sample {
            timestamp: pulse.trigger_timestamp,
            distance,
        }
    }
}
