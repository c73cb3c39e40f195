//! Distance smoothing
//!
//! Two stages over the most recent valid samples:
//! 1. Moving median over the window: drops single-sample spikes from
//!    cross-talk and multipath echoes
//! 2. Exponential moving average over consecutive medians: damps the jitter
//!    the median lets through
//!
//! # Confidence
//! ```text
//! confidence = clamp(1 - cv, 0, 1) * (1 - invalid_ratio)
//! ```
//! - `cv`: coefficient of variation (std / mean) of the window
//! - `invalid_ratio`: share of invalid samples among the last `window_size` pushes
//!
//! Invalid samples never enter the numeric window. Once warmed up, pushing one
//! returns the previous value marked as held, with the lowered confidence, so
//! the detector sees the uncertainty instead of a silent gap.

use embassy_time::Instant;
use heapless::{Deque, Vec};

use crate::config::{Config, MAX_WINDOW_SIZE};
use crate::distance::Sample;

/// Filter output for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SmoothedReading {
    /// Timestamp of the sample that produced this reading
    pub timestamp: Instant,
    /// Smoothed distance in cm
    pub value: f32,
    /// Trust in `value`, 0 (none) to 1 (full)
    pub confidence: f32,
    /// The sample was invalid and `value` is carried over from before
    pub held: bool,
}

/// Median + moving average filter with a confidence estimate
#[derive(Debug, Clone)]
pub struct Smoother {
    window: Deque<f32, MAX_WINDOW_SIZE>,
    window_size: usize,
    alpha: f32,
    average: Option<f32>,
    /// One bit per recent push, set for invalid samples (newest in bit 0)
    invalid_history: u32,
    recorded: usize,
    invalid_total: u32,
}

impl Smoother {
    /// Filter sized from the configuration
    pub fn new(config: &Config) -> Self {
        Self::with_window(config.smoothing_window_size, config.ema_alpha)
    }

    /// Filter over `window_size` samples (capped to the storage) with moving average factor `alpha`
    pub fn with_window(window_size: usize, alpha: f32) -> Self {
        Self {
            window: Deque::new(),
            window_size: window_size.clamp(1, MAX_WINDOW_SIZE),
            alpha,
            average: None,
            invalid_history: 0,
            recorded: 0,
            invalid_total: 0,
        }
    }

    /// Feeds one sample. Returns `None` until the first valid sample arrived.
    pub fn push(&mut self, sample: Sample) -> Option<SmoothedReading> {
        match sample.distance {
            Ok(distance_cm) => {
                self.record(false);
                if self.window.len() >= self.window_size {
                    self.window.pop_front();
                }
                // cannot fail, a slot was freed above
                let _ = self.window.push_back(distance_cm);

                let median = self.median();
                let average = match self.average {
                    Some(previous) => previous + self.alpha * (median - previous),
                    None => median,
                };
                self.average = Some(average);
                Some(self.reading(sample.timestamp, average, false))
            }
            Err(_) => {
                self.record(true);
                self.invalid_total = self.invalid_total.saturating_add(1);
                let held = self.average?;
                Some(self.reading(sample.timestamp, held, true))
            }
        }
    }

    /// Forgets all samples
    pub fn reset(&mut self) {
        *self = Self::with_window(self.window_size, self.alpha);
    }

    /// Invalid samples seen since creation or the last reset
    pub fn invalid_count(&self) -> u32 {
        self.invalid_total
    }

    /// Valid samples currently in the window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True before the first valid sample
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    fn reading(&self, timestamp: Instant, value: f32, held: bool) -> SmoothedReading {
        SmoothedReading {
            timestamp,
            value,
            confidence: self.confidence(),
            held,
        }
    }

    fn record(&mut self, invalid: bool) {
        let mask = if self.window_size >= 32 {
            u32::MAX
        } else {
            (1u32 << self.window_size) - 1
        };
        self.invalid_history = ((self.invalid_history << 1) | u32::from(invalid)) & mask;
        self.recorded = (self.recorded + 1).min(self.window_size);
    }

    fn median(&self) -> f32 {
        let mut sorted: Vec<f32, MAX_WINDOW_SIZE> = self.window.iter().copied().collect();
        sorted.sort_unstable_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    fn confidence(&self) -> f32 {
        let stability = (1.0 - self.variation()).clamp(0.0, 1.0);
        let invalid_ratio = if self.recorded == 0 {
            0.0
        } else {
            self.invalid_history.count_ones() as f32 / self.recorded as f32
        };
        stability * (1.0 - invalid_ratio)
    }

    /// Coefficient of variation of the window
    fn variation(&self) -> f32 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.window.iter().sum::<f32>() / n as f32;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = self
            .window
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f32>()
            / n as f32;
        libm::sqrtf(variance) / mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SampleError;
    use approx::assert_relative_eq;

    fn valid(ms: u64, distance_cm: f32) -> Sample {
        Sample {
            timestamp: Instant::from_millis(ms),
            distance: Ok(distance_cm),
        }
    }

    fn timeout(ms: u64) -> Sample {
        Sample {
            timestamp: Instant::from_millis(ms),
            distance: Err(SampleError::Timeout),
        }
    }

    #[test]
    fn cold_start_returns_nothing_until_valid_sample() {
        let mut smoother = Smoother::with_window(5, 0.5);
        assert_eq!(smoother.push(timeout(0)), None);
        assert_eq!(smoother.push(timeout(100)), None);
        let reading = smoother.push(valid(200, 120.0)).unwrap();
        assert_eq!(reading.value, 120.0);
        assert_eq!(reading.timestamp, Instant::from_millis(200));
        assert!(!reading.held);
        assert_eq!(smoother.invalid_count(), 2);
    }

    #[test]
    fn median_rejects_single_spike() {
        let mut smoother = Smoother::with_window(5, 1.0);
        for ms in 0..4 {
            smoother.push(valid(ms * 100, 150.0));
        }
        // multipath ghost
        let reading = smoother.push(valid(400, 20.0)).unwrap();
        assert_eq!(reading.value, 150.0);
    }

    #[test]
    fn converges_on_noisy_constant() {
        let truth = 150.0;
        let noise = [2.0, -2.0, 1.5, -1.5, 0.0, 1.0, -1.0];
        let mut smoother = Smoother::with_window(5, 0.5);

        let mut last = None;
        for (i, n) in noise.iter().cycle().take(40).enumerate() {
            last = smoother.push(valid(i as u64 * 100, truth + n));
        }
        let reading = last.unwrap();
        assert_relative_eq!(reading.value, truth, epsilon = 1.0);
        assert!(reading.confidence > 0.95);
    }

    #[test]
    fn moving_average_damps_step() {
        let mut smoother = Smoother::with_window(1, 0.5);
        smoother.push(valid(0, 100.0));
        let reading = smoother.push(valid(100, 200.0)).unwrap();
        assert_eq!(reading.value, 150.0);
    }

    #[test]
    fn invalid_sample_holds_value_and_lowers_confidence() {
        let mut smoother = Smoother::with_window(5, 0.5);
        for ms in 0..5 {
            smoother.push(valid(ms * 100, 150.0));
        }
        let held = smoother.push(timeout(500)).unwrap();
        assert!(held.held);
        assert_eq!(held.value, 150.0);
        assert_eq!(held.timestamp, Instant::from_millis(500));
        assert_relative_eq!(held.confidence, 0.8, epsilon = 1e-6);

        smoother.push(timeout(600));
        let held = smoother.push(timeout(700)).unwrap();
        assert_relative_eq!(held.confidence, 0.4, epsilon = 1e-6);
        // invalid samples never enter the numeric window
        assert_eq!(smoother.len(), 5);
    }

    #[test]
    fn invalid_ratio_recovers_after_valid_run() {
        let mut smoother = Smoother::with_window(5, 0.5);
        smoother.push(valid(0, 150.0));
        for ms in 1..4 {
            smoother.push(timeout(ms * 100));
        }
        let mut last = None;
        for ms in 4..9 {
            last = smoother.push(valid(ms * 100, 150.0));
        }
        assert_relative_eq!(last.unwrap().confidence, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn high_variance_lowers_confidence() {
        let mut smoother = Smoother::with_window(4, 0.5);
        for (ms, d) in [(0, 20.0), (100, 300.0), (200, 20.0), (300, 300.0)] {
            smoother.push(valid(ms, d));
        }
        let reading = smoother.push(valid(400, 20.0)).unwrap();
        assert!(reading.confidence < 0.5, "confidence {}", reading.confidence);
    }

    #[test]
    fn reset_forgets_history() {
        let mut smoother = Smoother::with_window(3, 0.5);
        smoother.push(valid(0, 150.0));
        smoother.reset();
        assert!(smoother.is_empty());
        assert_eq!(smoother.push(timeout(100)), None);
    }
}
