//! Sampling loop and control surface
//!
//! [`Sampler`] owns every pipeline stage and runs them once per period:
//! ```text
//! measure -> convert -> smooth -> detect -> publish
//! ```
//! Commands are only looked at between cycles, so an in-flight measurement
//! always finishes (or times out) before a stop or shutdown takes effect.
//!
//! The loop writes a [`Status`] snapshot to a [`StatusBoard`] after every
//! cycle. Other tasks only ever read it.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;

use crate::config::Config;
use crate::detector::{MotionDetector, MotionState};
use crate::distance::DistanceConverter;
use crate::error::ConfigError;
use crate::event::{Event, EventEmitter, EventQueue, EVENT_QUEUE_DEPTH};
use crate::pulse::{Clock, PulseSource};
use crate::smoother::{SmoothedReading, Smoother};

/// Commands buffered for the sampling loop
pub const COMMAND_QUEUE_DEPTH: usize = 4;

/// Control channel into the sampling loop
pub type CommandChannel<M> = Channel<M, Command, COMMAND_QUEUE_DEPTH>;

/// Control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Resume sampling
    Start,
    /// Pause sampling, state is kept
    Stop,
    /// Take the current reading as the new baseline
    Recalibrate,
    /// Leave the loop after the current cycle
    Shutdown,
}

/// Snapshot of the sampling loop
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Sampling is active
    pub running: bool,
    /// Detector state
    pub state: MotionState,
    /// Baseline in cm, `None` while calibrating
    pub baseline_cm: Option<f32>,
    /// Most recent smoother output
    pub last_reading: Option<SmoothedReading>,
    /// Events lost to a full queue
    pub dropped_events: u32,
    /// The sensor has been uncertain for too long
    pub dropout: bool,
    /// Timeouts and out-of-range samples so far
    pub invalid_samples: u32,
    /// Completed cycles
    pub cycles: u32,
}

impl Status {
    /// Status before the first cycle
    pub const fn new() -> Self {
        Self {
            running: false,
            state: MotionState::Idle,
            baseline_cm: None,
            last_reading: None,
            dropped_events: 0,
            dropout: false,
            invalid_samples: 0,
            cycles: 0,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest [`Status`], written by the sampling loop and read by anyone
pub struct StatusBoard<M: RawMutex> {
    status: Mutex<M, Cell<Status>>,
}

impl<M: RawMutex> StatusBoard<M> {
    /// Board holding [`Status::new`], usable in a `static`
    pub const fn new() -> Self {
        Self {
            status: Mutex::new(Cell::new(Status::new())),
        }
    }

    /// Replaces the snapshot
    pub fn publish(&self, status: Status) {
        self.status.lock(|cell| cell.set(status));
    }

    /// Copy of the latest snapshot
    pub fn read(&self) -> Status {
        self.status.lock(Cell::get)
    }
}

impl<M: RawMutex> Default for StatusBoard<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// The sampling loop with all pipeline stages
pub struct Sampler<'a, P, C, D, M: RawMutex> {
    pulse: P,
    clock: C,
    delay: D,
    interval: Duration,
    converter: DistanceConverter,
    smoother: Smoother,
    detector: MotionDetector,
    emitter: EventEmitter<'a, M, EVENT_QUEUE_DEPTH>,
    running: bool,
    last_reading: Option<SmoothedReading>,
    cycles: u32,
}

impl<'a, P, C, D, M> Sampler<'a, P, C, D, M>
where
    P: PulseSource,
    C: Clock,
    D: DelayNs,
    M: RawMutex,
{
    /// Validates `config` and builds the pipeline. Sampling starts out running.
    ///
    /// `events` must not have another producer.
    pub fn new(
        config: &Config,
        pulse: P,
        clock: C,
        delay: D,
        events: &'a EventQueue<M>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "sampler: every {} ms, threshold {} cm, debounce {}, window {}",
            config.sampling_interval_ms,
            config.threshold_cm,
            config.debounce_samples,
            config.smoothing_window_size
        );

        Ok(Self {
            pulse,
            clock,
            delay,
            interval: config.sampling_interval(),
            converter: DistanceConverter::new(config),
            smoother: Smoother::new(config),
            detector: MotionDetector::new(config),
            emitter: EventEmitter::new(events),
            running: true,
            last_reading: None,
            cycles: 0,
        })
    }

    /// Runs one pass through the pipeline, returning the event it emitted.
    ///
    /// Only a hardware failure of the pulse source is an error.
    pub async fn cycle(&mut self) -> Result<Option<Event>, P::Error> {
        let pulse = self.pulse.measure().await?;
        let sample = self.converter.convert(pulse);
        let reading = self.smoother.push(sample);
        if reading.is_some() {
            self.last_reading = reading;
        }

        let event = self.detector.update(sample.timestamp, reading.as_ref());
        if let Some(event) = event {
            self.emitter.publish(event);
        }
        self.cycles = self.cycles.wrapping_add(1);
        Ok(event)
    }

    /// Handles a command. Returns `false` once the loop has to end.
    pub fn apply(&mut self, command: Command) -> bool {
        debug!("command: {}", command);
        match command {
            Command::Start => {
                if !self.running {
                    info!("sampling resumed");
                }
                self.running = true;
            }
            Command::Stop => {
                if self.running {
                    info!("sampling paused");
                }
                self.running = false;
            }
            Command::Recalibrate => {
                let now = self.clock.now();
                if let Some(event) = self.detector.recalibrate(now, self.last_reading.as_ref()) {
                    self.emitter.publish(event);
                }
            }
            Command::Shutdown => {
                info!("sampling shut down after {} cycles", self.cycles);
                self.running = false;
                return false;
            }
        }
        true
    }

    /// Current snapshot
    pub fn status(&self) -> Status {
        Status {
            running: self.running,
            state: self.detector.state(),
            baseline_cm: self.detector.baseline(),
            last_reading: self.last_reading,
            dropped_events: self.emitter.dropped(),
            dropout: self.detector.in_dropout(),
            invalid_samples: self.smoother.invalid_count(),
            cycles: self.cycles,
        }
    }

    /// Updates the ambient temperature used for distance conversion.
    /// Out-of-range temperatures are rejected.
    pub fn set_temperature(&mut self, temperature_celsius: Option<f32>) -> Result<(), ConfigError> {
        self.converter.set_temperature(temperature_celsius)
    }

    /// Samples periodically until [`Command::Shutdown`].
    ///
    /// While paused the loop sleeps on the command channel. A hardware
    /// failure ends the loop with the pulse source's error.
    pub async fn run<CM, SM>(
        &mut self,
        commands: &CommandChannel<CM>,
        status: &StatusBoard<SM>,
    ) -> Result<(), P::Error>
    where
        CM: RawMutex,
        SM: RawMutex,
    {
        let mut next_cycle: Instant = self.clock.now();

        loop {
            while let Ok(command) = commands.try_receive() {
                if !self.apply(command) {
                    status.publish(self.status());
                    return Ok(());
                }
            }

            if !self.running {
                status.publish(self.status());
                let command = commands.receive().await;
                if !self.apply(command) {
                    status.publish(self.status());
                    return Ok(());
                }
                next_cycle = self.clock.now();
                continue;
            }

            self.cycle().await?;
            status.publish(self.status());

            next_cycle += self.interval;
            let now = self.clock.now();
            if now >= next_cycle {
                // overran the period, start over from here instead of catching up
                next_cycle = now;
                continue;
            }
            let wait_us = next_cycle.saturating_duration_since(now).as_micros();
            self.delay
                .delay_us(u32::try_from(wait_us).unwrap_or(u32::MAX))
                .await;
        }
    }
}
