//! Sentry configuration
//!
//! Every tunable of the pipeline lives in [`Config`]. The defaults come from the
//! `DEFAULT_*` constants below and describe an HC-SR04 watching a hallway or
//! doorway from a fixed mount.
//!
//! # Validation
//! [`Config::validate`] must pass before the sampling loop starts; the
//! [`crate::sampler::Sampler`] constructor enforces this.
//!
//! # Timing
//! ```text
//! echo round trip (max range) <= echo timeout < sampling interval
//! ```
//! The echo timeout bounds the worst case of one cycle, so it has to fit inside
//! the sampling interval.

use embassy_time::Duration;

use crate::distance::speed_of_sound_cm_per_us;
use crate::error::ConfigError;

/// HC-SR04 trigger pin (same header as the robot's front sensor)
pub const DEFAULT_TRIGGER_PIN: u8 = 15;

/// HC-SR04 echo pin, behind a 5V -> 3.3V divider
pub const DEFAULT_ECHO_PIN: u8 = 14;

/// Time between measurements (100ms lets echoes of the previous pulse fade out)
pub const DEFAULT_SAMPLING_INTERVAL_MS: u32 = 100;

/// Distance change counted as motion (25cm ignores people shifting in a chair)
pub const DEFAULT_THRESHOLD_CM: f32 = 25.0;

/// Deviation must fall this far below the threshold before motion clears
pub const DEFAULT_HYSTERESIS_CM: f32 = 5.0;

/// Consecutive exceeding cycles before motion is reported
pub const DEFAULT_DEBOUNCE_SAMPLES: u32 = 3;

/// Hold time after a detection before another one can fire
pub const DEFAULT_COOLDOWN_MS: u32 = 7_000;

/// Median window (5 samples rejects two spikes in a row)
pub const DEFAULT_SMOOTHING_WINDOW_SIZE: usize = 5;

/// Weight of the newest median in the moving average
pub const DEFAULT_EMA_ALPHA: f32 = 0.5;

/// How fast the baseline follows slow changes while idle
pub const DEFAULT_BASELINE_ALPHA: f32 = 0.05;

/// Readings below this confidence are not trusted for baseline or triggering
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Closest distance the HC-SR04 resolves
pub const DEFAULT_MIN_RANGE_CM: f32 = 2.0;

/// Farthest distance the HC-SR04 resolves reliably
pub const DEFAULT_MAX_RANGE_CM: f32 = 400.0;

/// Echo timeout (a 4m round trip takes ~23ms, 30ms leaves margin)
pub const DEFAULT_ECHO_TIMEOUT_MS: u32 = 30;

/// Uncertain cycles tolerated before the sensor counts as dropped out
pub const DEFAULT_DROPOUT_LIMIT: u32 = 5;

/// Time the detector waits for a first reading before using the default baseline
pub const DEFAULT_STARTUP_GRACE_MS: u32 = 2_000;

/// Baseline used when nothing was measured during the startup grace period
pub const DEFAULT_BASELINE_CM: f32 = 200.0;

/// Readings averaged into the initial baseline
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 1;

/// Upper bound for the smoothing window, fixed by the filter's storage
pub const MAX_WINDOW_SIZE: usize = 32;

/// Lowest accepted ambient temperature (HC-SR04 operating range)
pub const MIN_TEMPERATURE_CELSIUS: f32 = -40.0;

/// Highest accepted ambient temperature (HC-SR04 operating range)
pub const MAX_TEMPERATURE_CELSIUS: f32 = 85.0;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// GPIO driving the sensor's trigger input
    pub trigger_pin: u8,
    /// GPIO reading the sensor's echo output
    pub echo_pin: u8,
    /// Period of the sampling loop
    pub sampling_interval_ms: u32,
    /// Minimum |distance - baseline| counted as motion
    pub threshold_cm: f32,
    /// Clearing happens below `threshold_cm - hysteresis_cm`
    pub hysteresis_cm: f32,
    /// Consecutive exceeding cycles needed to trigger
    pub debounce_samples: u32,
    /// Minimum time between a detection and its clearing
    pub cooldown_ms: u32,
    /// Number of valid samples in the median window
    pub smoothing_window_size: usize,
    /// Moving average factor applied to the medians
    pub ema_alpha: f32,
    /// Baseline adaptation factor while idle
    pub baseline_alpha: f32,
    /// Readings below this confidence count as uncertain
    pub min_confidence: f32,
    /// Upper bound of valid distances
    pub max_range_cm: f32,
    /// Lower bound of valid distances
    pub min_range_cm: f32,
    /// Longest wait for a complete echo after the trigger
    pub echo_timeout_ms: u32,
    /// Ambient temperature for the speed of sound, if known
    pub temperature_celsius: Option<f32>,
    /// Uncertain cycles tolerated before reporting a dropout
    pub dropout_limit: u32,
    /// Wait for the first reading before falling back to `default_baseline_cm`
    pub startup_grace_ms: u32,
    /// Baseline used when the startup grace period passes without readings
    pub default_baseline_cm: f32,
    /// Certain readings averaged into a fresh baseline
    pub calibration_samples: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger_pin: DEFAULT_TRIGGER_PIN,
            echo_pin: DEFAULT_ECHO_PIN,
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            threshold_cm: DEFAULT_THRESHOLD_CM,
            hysteresis_cm: DEFAULT_HYSTERESIS_CM,
            debounce_samples: DEFAULT_DEBOUNCE_SAMPLES,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            smoothing_window_size: DEFAULT_SMOOTHING_WINDOW_SIZE,
            ema_alpha: DEFAULT_EMA_ALPHA,
            baseline_alpha: DEFAULT_BASELINE_ALPHA,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_range_cm: DEFAULT_MAX_RANGE_CM,
            min_range_cm: DEFAULT_MIN_RANGE_CM,
            echo_timeout_ms: DEFAULT_ECHO_TIMEOUT_MS,
            temperature_celsius: None,
            dropout_limit: DEFAULT_DROPOUT_LIMIT,
            startup_grace_ms: DEFAULT_STARTUP_GRACE_MS,
            default_baseline_cm: DEFAULT_BASELINE_CM,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
        }
    }
}

impl Config {
    /// Checks every field, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger_pin == self.echo_pin {
            return Err(ConfigError::SharedPins);
        }
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::ZeroSamplingInterval);
        }
        // written as !(x > 0) so NaN is rejected too
        if !(self.threshold_cm > 0.0) {
            return Err(ConfigError::ThresholdNotPositive);
        }
        if !(self.hysteresis_cm >= 0.0 && self.hysteresis_cm < self.threshold_cm) {
            return Err(ConfigError::HysteresisOutOfRange);
        }
        if self.debounce_samples < 1 {
            return Err(ConfigError::DebounceTooShort);
        }
        if !(1..=MAX_WINDOW_SIZE).contains(&self.smoothing_window_size) {
            return Err(ConfigError::WindowSizeOutOfRange);
        }
        if !is_factor(self.ema_alpha) || !is_factor(self.baseline_alpha) {
            return Err(ConfigError::AlphaOutOfRange);
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::MinConfidenceOutOfRange);
        }
        if !(self.min_range_cm > 0.0 && self.min_range_cm < self.max_range_cm) {
            return Err(ConfigError::InvalidRange);
        }
        check_temperature(self.temperature_celsius)?;
        if (self.echo_timeout_ms as f32) * 1000.0 < self.round_trip_us(self.max_range_cm) {
            return Err(ConfigError::EchoTimeoutTooShort);
        }
        if self.echo_timeout_ms >= self.sampling_interval_ms {
            return Err(ConfigError::EchoTimeoutExceedsInterval);
        }
        if self.dropout_limit == 0 {
            return Err(ConfigError::ZeroDropoutLimit);
        }
        if self.calibration_samples == 0 {
            return Err(ConfigError::ZeroCalibrationSamples);
        }
        if !(self.min_range_cm..=self.max_range_cm).contains(&self.default_baseline_cm) {
            return Err(ConfigError::DefaultBaselineOutOfRange);
        }
        Ok(())
    }

    /// Sampling loop period
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms as u64)
    }

    /// Longest wait for a complete echo
    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms as u64)
    }

    /// Minimum hold after a detection
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms as u64)
    }

    /// Startup wait before the default baseline is used
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms as u64)
    }

    /// Speed of sound for the configured temperature, in cm/µs
    pub fn speed_of_sound(&self) -> f32 {
        speed_of_sound_cm_per_us(self.temperature_celsius)
    }

    /// Echo time for an object at `distance_cm`, in µs
    fn round_trip_us(&self, distance_cm: f32) -> f32 {
        2.0 * distance_cm / self.speed_of_sound()
    }
}

/// Rejects temperatures outside the sensor's operating range, NaN included
pub(crate) fn check_temperature(temperature_celsius: Option<f32>) -> Result<(), ConfigError> {
    match temperature_celsius {
        Some(celsius)
            if !(MIN_TEMPERATURE_CELSIUS..=MAX_TEMPERATURE_CELSIUS).contains(&celsius) =>
        {
            Err(ConfigError::InvalidTemperature)
        }
        _ => Ok(()),
    }
}

/// Factor usable as a moving average weight
fn is_factor(alpha: f32) -> bool {
    alpha > 0.0 && alpha <= 1.0
}
