//! Motion detection state machine
//!
//! Compares each smoothed reading with a slowly adapting baseline.
//!
//! # States
//! ```text
//!            deviation >= threshold for debounce_samples cycles
//!   Idle ──────────────────────────────────────────────────────> Triggered
//!    ^                                                               │ next cycle
//!    │ cooldown elapsed and deviation < threshold - hysteresis       v
//!    └──────────────────────────────────────────────────────── Cooldown
//! ```
//! - Idle: the baseline follows certain readings that stay below the threshold
//! - Triggered: MotionDetected was just emitted
//! - Cooldown: no new trigger and no baseline updates until motion clears
//!
//! # Certainty
//! A reading is certain when it was produced by a valid sample and its
//! confidence reaches `min_confidence`. Everything else (no reading, held
//! reading, low confidence) is uncertain: it never moves the baseline, never
//! counts towards a trigger, and never clears motion. More than
//! `dropout_limit` uncertain cycles in a row are reported as a dropout; the
//! state is kept as it was.
//!
//! # Baseline Seeding
//! The baseline starts out as the mean of the first `calibration_samples`
//! certain readings. If those do not arrive within the startup grace period,
//! whatever was collected is used, or the configured default baseline.

use embassy_time::{Duration, Instant};

use crate::config::Config;
use crate::event::Event;
use crate::smoother::SmoothedReading;

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionState {
    /// Tracking the baseline, waiting for a sustained deviation
    Idle,
    /// Motion was reported on this cycle
    Triggered {
        /// Cycle that fired MotionDetected
        at: Instant,
    },
    /// Holding after a trigger until the cooldown elapsed and the deviation subsided
    Cooldown {
        /// Trigger time the cooldown counts from
        since: Instant,
    },
}

/// Reference distance
#[derive(Debug, Clone, Copy, PartialEq)]
enum Baseline {
    /// Collecting readings for the initial value
    Seeding {
        since: Option<Instant>,
        sum: f32,
        count: u32,
    },
    /// Tracking, in cm
    Settled(f32),
}

impl Baseline {
    const fn seeding() -> Self {
        Self::Seeding {
            since: None,
            sum: 0.0,
            count: 0,
        }
    }
}

/// Baseline-deviation motion detector with debounce, cooldown and hysteresis
#[derive(Debug, Clone)]
pub struct MotionDetector {
    threshold_cm: f32,
    clear_below_cm: f32,
    debounce_samples: u32,
    cooldown: Duration,
    min_confidence: f32,
    baseline_alpha: f32,
    dropout_limit: u32,
    startup_grace: Duration,
    default_baseline_cm: f32,
    calibration_samples: u32,

    state: MotionState,
    baseline: Baseline,
    exceedances: u32,
    /// Deviation of the latest certain reading, in cm
    last_delta: Option<f32>,
    uncertain_run: u32,
    dropout: bool,
}

impl MotionDetector {
    /// Idle detector with an unseeded baseline
    pub fn new(config: &Config) -> Self {
        Self {
            threshold_cm: config.threshold_cm,
            clear_below_cm: config.threshold_cm - config.hysteresis_cm,
            debounce_samples: config.debounce_samples,
            cooldown: config.cooldown(),
            min_confidence: config.min_confidence,
            baseline_alpha: config.baseline_alpha,
            dropout_limit: config.dropout_limit,
            startup_grace: config.startup_grace(),
            default_baseline_cm: config.default_baseline_cm,
            calibration_samples: config.calibration_samples,
            state: MotionState::Idle,
            baseline: Baseline::seeding(),
            exceedances: 0,
            last_delta: None,
            uncertain_run: 0,
            dropout: false,
        }
    }

    /// Current state
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Baseline in cm, `None` while still seeding
    pub fn baseline(&self) -> Option<f32> {
        match self.baseline {
            Baseline::Settled(baseline) => Some(baseline),
            Baseline::Seeding { .. } => None,
        }
    }

    /// Whether the sensor is currently considered dropped out
    pub fn in_dropout(&self) -> bool {
        self.dropout
    }

    /// Consecutive uncertain cycles so far
    pub fn uncertain_run(&self) -> u32 {
        self.uncertain_run
    }

    /// Advances the state machine by one cycle.
    ///
    /// `reading` is `None` when the smoother has nothing yet. Returns the event
    /// of the transition taken, if any.
    pub fn update(&mut self, now: Instant, reading: Option<&SmoothedReading>) -> Option<Event> {
        let certain = reading.filter(|r| self.is_certain(r)).map(|r| r.value);
        self.track_certainty(certain.is_some());

        let Baseline::Settled(baseline) = self.baseline else {
            self.seed(now, certain);
            return None;
        };

        // Triggered only lasts for the cycle that fired
        if let MotionState::Triggered { at } = self.state {
            self.state = MotionState::Cooldown { since: at };
        }

        let Some(value) = certain else {
            // breaks the consecutive run
            self.exceedances = 0;
            return None;
        };

        let (next, event) = self.transition(now, value, baseline);
        self.state = next;
        event
    }

    /// Resets the baseline to `reading` and returns to Idle.
    ///
    /// An uncertain or missing reading restarts seeding from the next certain
    /// ones. If motion was asserted, MotionCleared is returned so detections
    /// stay paired. Its delta is the one of `reading` when that is certain,
    /// otherwise the last certain deviation seen.
    pub fn recalibrate(&mut self, now: Instant, reading: Option<&SmoothedReading>) -> Option<Event> {
        let certain = reading.filter(|r| self.is_certain(r)).map(|r| r.value);

        let event = match self.state {
            MotionState::Idle => None,
            MotionState::Triggered { .. } | MotionState::Cooldown { .. } => {
                let current = certain.zip(self.baseline()).map(|(value, baseline)| value - baseline);
                // motion is only asserted after a certain deviation was seen
                let delta = current.or(self.last_delta).unwrap_or_default();
                Some(Event::cleared(now, delta))
            }
        };

        info!("recalibrating baseline (was {})", self.baseline());
        self.state = MotionState::Idle;
        self.exceedances = 0;
        self.last_delta = None;
        self.baseline = Baseline::seeding();
        self.seed(now, certain);
        event
    }

    /// The transition function for a certain reading
    fn transition(&mut self, now: Instant, value: f32, baseline: f32) -> (MotionState, Option<Event>) {
        let delta = value - baseline;
        self.last_delta = Some(delta);

        match self.state {
            MotionState::Idle if libm::fabsf(delta) >= self.threshold_cm => {
                self.exceedances += 1;
                if self.exceedances < self.debounce_samples {
                    debug!("deviation {} cm ({}/{})", delta, self.exceedances, self.debounce_samples);
                    return (MotionState::Idle, None);
                }
                self.exceedances = 0;
                info!("motion detected: {} cm from baseline {}", delta, baseline);
                (MotionState::Triggered { at: now }, Some(Event::detected(now, delta)))
            }
            MotionState::Idle => {
                self.exceedances = 0;
                self.baseline = Baseline::Settled(baseline + self.baseline_alpha * delta);
                (MotionState::Idle, None)
            }
            MotionState::Triggered { at: since } | MotionState::Cooldown { since } => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed >= self.cooldown && libm::fabsf(delta) < self.clear_below_cm {
                    info!("motion cleared: {} cm from baseline {}", delta, baseline);
                    (MotionState::Idle, Some(Event::cleared(now, delta)))
                } else {
                    (MotionState::Cooldown { since }, None)
                }
            }
        }
    }

    fn is_certain(&self, reading: &SmoothedReading) -> bool {
        !reading.held && reading.confidence >= self.min_confidence
    }

    fn track_certainty(&mut self, certain: bool) {
        if certain {
            if self.dropout {
                info!("sensor recovered after {} uncertain cycles", self.uncertain_run);
            }
            self.dropout = false;
            self.uncertain_run = 0;
            return;
        }

        self.uncertain_run = self.uncertain_run.saturating_add(1);
        if self.uncertain_run > self.dropout_limit && !self.dropout {
            self.dropout = true;
            warn!(
                "sensor dropout: {} uncertain cycles, baseline and triggers frozen",
                self.uncertain_run
            );
        }
    }

    /// Collects a seeding reading and settles the baseline when enough arrived or time is up
    fn seed(&mut self, now: Instant, certain: Option<f32>) {
        let Baseline::Seeding { since, sum, count } = &mut self.baseline else {
            return;
        };
        let started = *since.get_or_insert(now);
        if let Some(value) = certain {
            *sum += value;
            *count += 1;
        }

        let (sum, count) = (*sum, *count);
        if count >= self.calibration_samples {
            let baseline = sum / count as f32;
            info!("baseline calibrated at {} cm from {} readings", baseline, count);
            self.baseline = Baseline::Settled(baseline);
        } else if now.saturating_duration_since(started) >= self.startup_grace {
            let baseline = if count > 0 {
                sum / count as f32
            } else {
                self.default_baseline_cm
            };
            warn!(
                "baseline calibration incomplete ({} readings), using {} cm",
                count, baseline
            );
            self.baseline = Baseline::Settled(baseline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use approx::assert_relative_eq;

    const INTERVAL_MS: u64 = 100;

    fn config() -> Config {
        Config {
            threshold_cm: 30.0,
            hysteresis_cm: 5.0,
            debounce_samples: 3,
            cooldown_ms: 1_000,
            ..Config::default()
        }
    }

    fn reading(cycle: u64, value: f32) -> SmoothedReading {
        SmoothedReading {
            timestamp: Instant::from_millis(cycle * INTERVAL_MS),
            value,
            confidence: 1.0,
            held: false,
        }
    }

    fn held(cycle: u64, value: f32) -> SmoothedReading {
        SmoothedReading {
            confidence: 0.4,
            held: true,
            ..reading(cycle, value)
        }
    }

    /// Drives the detector over `values` starting at `cycle`, collecting events
    struct Harness {
        detector: MotionDetector,
        cycle: u64,
        events: Vec<(u64, Event)>,
    }

    impl Harness {
        fn settled_at(baseline: f32) -> Self {
            let mut harness = Self {
                detector: MotionDetector::new(&config()),
                cycle: 0,
                events: Vec::new(),
            };
            harness.feed(baseline, 1);
            assert_eq!(harness.detector.baseline(), Some(baseline));
            harness
        }

        fn step(&mut self, reading: Option<SmoothedReading>) -> Option<Event> {
            let now = Instant::from_millis(self.cycle * INTERVAL_MS);
            let event = self.detector.update(now, reading.as_ref());
            if let Some(event) = event {
                self.events.push((self.cycle, event));
            }
            self.cycle += 1;
            event
        }

        fn feed(&mut self, value: f32, cycles: usize) {
            for _ in 0..cycles {
                let cycle = self.cycle;
                self.step(Some(reading(cycle, value)));
            }
        }
    }

    #[test]
    fn scenario_a_steady_distance_emits_nothing() {
        let mut h = Harness::settled_at(150.0);
        h.feed(150.0, 20);
        assert!(h.events.is_empty());
        assert_eq!(h.detector.state(), MotionState::Idle);
        assert_eq!(h.detector.baseline(), Some(150.0));
    }

    #[test]
    fn scenario_b_fires_on_third_deviating_cycle() {
        let mut h = Harness::settled_at(150.0);
        let first_deviation = h.cycle;
        h.feed(80.0, 5);

        assert_eq!(h.events.len(), 1);
        let (cycle, event) = h.events[0];
        assert_eq!(cycle, first_deviation + 2);
        assert_eq!(event.kind, EventKind::MotionDetected);
        assert_relative_eq!(event.distance_delta, -70.0, epsilon = 1e-4);
        assert!(matches!(h.detector.state(), MotionState::Cooldown { .. }));
    }

    #[test]
    fn scenario_c_clears_once_after_cooldown() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 5);
        let (trigger_cycle, _) = h.events[0];

        // back to the baseline, well past the 1s cooldown
        h.feed(150.0, 20);

        let cleared: Vec<_> = h
            .events
            .iter()
            .filter(|(_, e)| e.kind == EventKind::MotionCleared)
            .collect();
        assert_eq!(cleared.len(), 1);
        let (clear_cycle, event) = cleared[0];
        assert_eq!(*clear_cycle, trigger_cycle + 10);
        assert_relative_eq!(event.distance_delta, 0.0, epsilon = 1e-4);
        assert_eq!(h.detector.state(), MotionState::Idle);
    }

    #[test]
    fn scenario_d_timeouts_freeze_detector() {
        let mut h = Harness::settled_at(150.0);
        h.feed(150.0, 5);
        for _ in 0..10 {
            let cycle = h.cycle;
            h.step(Some(held(cycle, 150.0)));
        }

        assert!(h.events.is_empty());
        assert!(h.detector.in_dropout());
        assert_eq!(h.detector.uncertain_run(), 10);
        assert_eq!(h.detector.baseline(), Some(150.0));
        assert_eq!(h.detector.state(), MotionState::Idle);

        h.feed(150.0, 1);
        assert!(!h.detector.in_dropout());
    }

    #[test]
    fn held_readings_are_uncertain_even_when_confident() {
        let mut h = Harness::settled_at(150.0);
        for run in 1..=4 {
            let cycle = h.cycle;
            h.step(Some(SmoothedReading {
                confidence: 0.8,
                ..held(cycle, 80.0)
            }));
            assert_eq!(h.detector.uncertain_run(), run);
        }

        assert_eq!(h.detector.baseline(), Some(150.0));
        assert_eq!(h.detector.state(), MotionState::Idle);
        assert!(h.events.is_empty());

        let cycle = h.cycle;
        h.step(Some(SmoothedReading {
            confidence: 0.8,
            ..held(cycle, 170.0)
        }));
        assert_eq!(h.detector.baseline(), Some(150.0));
    }

    #[test]
    fn dropout_starts_once_run_exceeds_limit() {
        let limit = config().dropout_limit;
        let mut h = Harness::settled_at(150.0);

        for _ in 0..limit {
            h.step(None);
        }
        assert_eq!(h.detector.uncertain_run(), limit);
        assert!(!h.detector.in_dropout());

        h.step(None);
        assert!(h.detector.in_dropout());
    }

    #[test]
    fn fewer_exceedances_than_debounce_never_trigger() {
        let mut h = Harness::settled_at(150.0);
        for _ in 0..10 {
            h.feed(80.0, 2);
            h.feed(150.0, 1);
        }
        assert!(h.events.is_empty());
    }

    #[test]
    fn uncertain_reading_breaks_debounce_run() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 2);
        let cycle = h.cycle;
        h.step(Some(SmoothedReading {
            confidence: 0.1,
            ..reading(cycle, 80.0)
        }));
        h.feed(80.0, 2);
        assert!(h.events.is_empty());

        h.feed(80.0, 1);
        assert_eq!(h.events.len(), 1);
    }

    #[test]
    fn deviation_lasting_past_cooldown_holds_without_duplicates() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 50);

        assert_eq!(h.events.len(), 1);
        assert!(matches!(h.detector.state(), MotionState::Cooldown { .. }));

        h.feed(150.0, 1);
        assert_eq!(h.events.len(), 2);
        assert_eq!(h.events[1].1.kind, EventKind::MotionCleared);
    }

    #[test]
    fn detections_alternate_with_clears() {
        let mut h = Harness::settled_at(150.0);
        for _ in 0..4 {
            h.feed(80.0, 15);
            h.feed(150.0, 15);
            h.feed(300.0, 4);
            h.feed(150.0, 15);
        }

        let kinds: Vec<_> = h.events.iter().map(|(_, e)| e.kind).collect();
        assert!(!kinds.is_empty());
        for pair in kinds.windows(2) {
            assert_ne!(pair[0], pair[1], "events must alternate: {kinds:?}");
        }
        assert_eq!(kinds[0], EventKind::MotionDetected);
    }

    #[test]
    fn baseline_frozen_outside_idle() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 3);
        assert!(matches!(h.detector.state(), MotionState::Triggered { .. }));

        // small drifts that would move the baseline while idle
        for value in [140.0, 135.0, 140.0, 145.0] {
            h.feed(value, 1);
            assert_eq!(h.detector.baseline(), Some(150.0));
        }
    }

    #[test]
    fn triggered_lasts_one_cycle() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 3);
        let at = Instant::from_millis((h.cycle - 1) * INTERVAL_MS);
        assert_eq!(h.detector.state(), MotionState::Triggered { at });

        h.step(None);
        assert_eq!(h.detector.state(), MotionState::Cooldown { since: at });
    }

    #[test]
    fn hysteresis_delays_clear() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 3);
        // 27cm off: below the 30cm threshold but above 30 - 5
        h.feed(123.0, 20);
        assert_eq!(h.events.len(), 1);

        h.feed(130.0, 1);
        assert_eq!(h.events.len(), 2);
    }

    #[test]
    fn baseline_follows_slow_drift() {
        let mut h = Harness::settled_at(150.0);
        h.feed(160.0, 100);
        assert!(h.events.is_empty());
        assert_relative_eq!(h.detector.baseline().unwrap(), 160.0, epsilon = 0.1);
    }

    #[test]
    fn low_confidence_does_not_move_baseline() {
        let mut h = Harness::settled_at(150.0);
        for _ in 0..20 {
            let cycle = h.cycle;
            h.step(Some(SmoothedReading {
                confidence: 0.2,
                ..reading(cycle, 170.0)
            }));
        }
        assert_eq!(h.detector.baseline(), Some(150.0));
        assert!(h.events.is_empty());
    }

    #[test]
    fn baseline_seeds_from_first_certain_reading() {
        let mut detector = MotionDetector::new(&config());
        assert_eq!(detector.baseline(), None);

        assert_eq!(detector.update(Instant::from_millis(0), None), None);
        assert_eq!(detector.baseline(), None);
        let r = held(1, 90.0);
        detector.update(r.timestamp, Some(&r));
        assert_eq!(detector.baseline(), None);

        let r = reading(2, 142.0);
        detector.update(r.timestamp, Some(&r));
        assert_eq!(detector.baseline(), Some(142.0));
    }

    #[test]
    fn default_baseline_after_grace_period() {
        let mut detector = MotionDetector::new(&config());
        detector.update(Instant::from_millis(0), None);
        detector.update(Instant::from_millis(1_999), None);
        assert_eq!(detector.baseline(), None);
        detector.update(Instant::from_millis(2_000), None);
        assert_eq!(detector.baseline(), Some(config().default_baseline_cm));
    }

    #[test]
    fn calibration_averages_several_readings() {
        let config = Config {
            calibration_samples: 4,
            ..config()
        };
        let mut detector = MotionDetector::new(&config);
        for (cycle, value) in [(0, 148.0), (1, 152.0), (2, 149.0)] {
            let r = reading(cycle, value);
            detector.update(r.timestamp, Some(&r));
            assert_eq!(detector.baseline(), None);
        }
        let r = reading(3, 151.0);
        detector.update(r.timestamp, Some(&r));
        assert_eq!(detector.baseline(), Some(150.0));
    }

    #[test]
    fn partial_calibration_used_after_grace_period() {
        let config = Config {
            calibration_samples: 10,
            ..config()
        };
        let mut detector = MotionDetector::new(&config);
        let r = reading(0, 120.0);
        detector.update(r.timestamp, Some(&r));
        detector.update(Instant::from_millis(2_500), None);
        assert_eq!(detector.baseline(), Some(120.0));
    }

    #[test]
    fn recalibrate_resets_baseline_to_current_reading() {
        let mut h = Harness::settled_at(150.0);
        let now = Instant::from_millis(h.cycle * INTERVAL_MS);
        let r = reading(h.cycle, 95.0);
        assert_eq!(h.detector.recalibrate(now, Some(&r)), None);
        assert_eq!(h.detector.baseline(), Some(95.0));

        h.feed(95.0, 10);
        assert!(h.events.is_empty());
    }

    #[test]
    fn recalibrate_during_cooldown_clears_motion() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 5);
        let now = Instant::from_millis(h.cycle * INTERVAL_MS);
        let r = reading(h.cycle, 80.0);

        let event = h.detector.recalibrate(now, Some(&r)).unwrap();
        assert_eq!(event.kind, EventKind::MotionCleared);
        assert_relative_eq!(event.distance_delta, -70.0, epsilon = 1e-4);
        assert_eq!(h.detector.state(), MotionState::Idle);
        assert_eq!(h.detector.baseline(), Some(80.0));
    }

    #[test]
    fn recalibrate_on_uncertain_reading_reports_last_deviation() {
        let mut h = Harness::settled_at(150.0);
        h.feed(80.0, 4);
        h.feed(90.0, 1);
        let now = Instant::from_millis(h.cycle * INTERVAL_MS);
        let r = held(h.cycle, 150.0);

        let event = h.detector.recalibrate(now, Some(&r)).unwrap();
        assert_eq!(event.kind, EventKind::MotionCleared);
        assert_relative_eq!(event.distance_delta, -60.0, epsilon = 1e-4);
        assert_eq!(h.detector.baseline(), None);
    }

    #[test]
    fn recalibrate_without_reading_seeds_again() {
        let mut h = Harness::settled_at(150.0);
        let now = Instant::from_millis(h.cycle * INTERVAL_MS);
        h.detector.recalibrate(now, None);
        assert_eq!(h.detector.baseline(), None);

        h.feed(120.0, 1);
        assert_eq!(h.detector.baseline(), Some(120.0));
    }
}
