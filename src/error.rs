//! Error types
//!
//! Two families:
//! - [`SampleError`]: why a single measurement carries no distance. Never fatal,
//!   the sampling loop keeps going.
//! - [`ConfigError`]: a configuration that must be rejected before the loop starts.
//!
//! Hardware failures are the pin drivers' own error types, wrapped in
//! [`crate::pulse::PulseError`].

use core::fmt::{Display, Formatter};

/// Why a [`crate::distance::Sample`] is invalid.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleError {
    /// No complete echo arrived before the echo timeout
    Timeout,
    /// The echo implied a distance outside the sensor's range
    OutOfRange {
        /// Distance the echo would have meant, in cm
        distance_cm: f32,
    },
}

impl Display for SampleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => f.write_str("no echo before timeout"),
            Self::OutOfRange { distance_cm } => {
                write!(f, "echo implies {distance_cm} cm, outside sensor range")
            }
        }
    }
}

impl core::error::Error for SampleError {}

/// Rejected configuration value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Trigger and echo must be different pins
    SharedPins,
    /// Sampling interval is zero
    ZeroSamplingInterval,
    /// Motion threshold must be positive
    ThresholdNotPositive,
    /// Hysteresis must lie in `[0, threshold)`
    HysteresisOutOfRange,
    /// At least one sample is needed to debounce
    DebounceTooShort,
    /// Window size must lie in `1..=MAX_WINDOW_SIZE`
    WindowSizeOutOfRange,
    /// Smoothing or baseline factor outside `(0, 1]`
    AlphaOutOfRange,
    /// Minimum confidence outside `[0, 1]`
    MinConfidenceOutOfRange,
    /// Range bounds must satisfy `0 < min < max`
    InvalidRange,
    /// The echo timeout cannot cover a round trip to `max_range_cm`
    EchoTimeoutTooShort,
    /// The echo timeout must be shorter than the sampling interval
    EchoTimeoutExceedsInterval,
    /// Dropout limit is zero
    ZeroDropoutLimit,
    /// Baseline calibration needs at least one reading
    ZeroCalibrationSamples,
    /// Default baseline lies outside the sensor range
    DefaultBaselineOutOfRange,
    /// Temperature outside the sensor's operating range
    InvalidTemperature,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            Self::SharedPins => "trigger and echo share a pin",
            Self::ZeroSamplingInterval => "sampling interval must be > 0",
            Self::ThresholdNotPositive => "threshold must be > 0",
            Self::HysteresisOutOfRange => "hysteresis must be >= 0 and below the threshold",
            Self::DebounceTooShort => "debounce_samples must be >= 1",
            Self::WindowSizeOutOfRange => "smoothing window size out of range",
            Self::AlphaOutOfRange => "smoothing factors must lie in (0, 1]",
            Self::MinConfidenceOutOfRange => "min_confidence must lie in [0, 1]",
            Self::InvalidRange => "range must satisfy 0 < min < max",
            Self::EchoTimeoutTooShort => "echo timeout shorter than a round trip to max range",
            Self::EchoTimeoutExceedsInterval => "echo timeout must be shorter than the sampling interval",
            Self::ZeroDropoutLimit => "dropout limit must be >= 1",
            Self::ZeroCalibrationSamples => "calibration_samples must be >= 1",
            Self::DefaultBaselineOutOfRange => "default baseline outside sensor range",
            Self::InvalidTemperature => "temperature outside -40..=85 °C",
        };
        f.write_str(reason)
    }
}

impl core::error::Error for ConfigError {}
