//! Echo pulse timing
//!
//! Fires the HC-SR04 trigger and times the echo line. This is the only part of
//! the pipeline touching hardware timing.
//!
//! # Sensor Operation
//! - A 10µs high pulse on the trigger starts a measurement
//! - The sensor raises echo once the burst is sent and drops it when the echo returns
//! - The echo high time is the round-trip time of flight
//!
//! # Timing Rules
//! - Edges are only watched after the trigger pulse has ended, so anything the
//!   line does while the trigger settles is ignored
//! - The first complete rising -> falling interval after the trigger is the echo
//! - The whole measurement is bounded by the echo timeout; a missing or
//!   unfinished echo yields [`Echo::Timeout`] instead of blocking
//!
//! The sampler only sees the [`PulseSource`] capability, so tests can feed it
//! scripted pulses without any pins.

use core::fmt::{Debug, Display, Formatter};

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;

/// Trigger high time required by the HC-SR04
pub const TRIGGER_PULSE_US: u32 = 10;

/// Result of waiting for the echo
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Echo {
    /// Echo line was high for this long
    Received(Duration),
    /// No complete echo before the timeout
    Timeout,
}

/// One measurement as it came off the sensor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawPulse {
    /// When the trigger pulse ended
    pub trigger_timestamp: Instant,
    /// Echo duration or timeout marker
    pub echo: Echo,
}

impl RawPulse {
    /// Pulse whose echo lasted `duration`
    pub const fn received(trigger_timestamp: Instant, duration: Duration) -> Self {
        Self {
            trigger_timestamp,
            echo: Echo::Received(duration),
        }
    }

    /// Pulse without a complete echo
    pub const fn timed_out(trigger_timestamp: Instant) -> Self {
        Self {
            trigger_timestamp,
            echo: Echo::Timeout,
        }
    }
}

/// Source of monotonic timestamps
pub trait Clock {
    /// Current time
    fn now(&self) -> Instant;
}

/// Clock backed by the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Anything that can perform one ultrasonic measurement.
///
/// Implementations must not be shared between concurrent callers; `&mut self`
/// keeps one measurement in flight per sensor.
#[allow(async_fn_in_trait)]
pub trait PulseSource {
    /// Hardware failure, fatal for the sampling loop
    type Error: Debug;

    /// Emits a trigger pulse and times the echo. A missing echo is not an error.
    async fn measure(&mut self) -> Result<RawPulse, Self::Error>;
}

/// Pin failure while measuring
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulseError<T, E> {
    /// Driving the trigger line failed
    Trigger(T),
    /// Waiting on the echo line failed
    Echo(E),
}

impl<T: Debug, E: Debug> Display for PulseError<T, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Trigger(e) => write!(f, "trigger line failed: {e:?}"),
            Self::Echo(e) => write!(f, "echo line failed: {e:?}"),
        }
    }
}

impl<T: Debug, E: Debug> core::error::Error for PulseError<T, E> {}

/// HC-SR04 driver over embedded-hal pins.
///
/// The delay is used both for the trigger pulse and as the echo timeout, the
/// clock timestamps the edges.
pub struct Hcsr04<T, E, C, D> {
    trigger: T,
    echo: E,
    clock: C,
    delay: D,
    timeout: Duration,
}

impl<T, E, C, D> Hcsr04<T, E, C, D>
where
    T: OutputPin,
    E: Wait,
    C: Clock,
    D: DelayNs,
{
    /// Creates a driver giving up on echoes after `timeout`.
    /// The trigger line is expected to idle low.
    pub fn new(trigger: T, echo: E, clock: C, delay: D, timeout: Duration) -> Self {
        Self {
            trigger,
            echo,
            clock,
            delay,
            timeout,
        }
    }

    /// Releases the pins
    pub fn release(self) -> (T, E) {
        (self.trigger, self.echo)
    }

    /// Microseconds left until `deadline`, zero if it has passed
    fn remaining_us(&self, deadline: Instant) -> u32 {
        let remaining = deadline.saturating_duration_since(self.clock.now());
        u32::try_from(remaining.as_micros()).unwrap_or(u32::MAX)
    }
}

impl<T, E, C, D> PulseSource for Hcsr04<T, E, C, D>
where
    T: OutputPin,
    E: Wait,
    C: Clock,
    D: DelayNs,
{
    type Error = PulseError<T::Error, E::Error>;

    async fn measure(&mut self) -> Result<RawPulse, Self::Error> {
        self.trigger.set_high().map_err(PulseError::Trigger)?;
        self.delay.delay_us(TRIGGER_PULSE_US).await;
        self.trigger.set_low().map_err(PulseError::Trigger)?;

        let triggered_at = self.clock.now();
        let deadline = triggered_at + self.timeout;

        // rising edge: sensor finished the burst
        let wait_us = self.remaining_us(deadline);
        match select(self.echo.wait_for_rising_edge(), self.delay.delay_us(wait_us)).await {
            Either::First(edge) => edge.map_err(PulseError::Echo)?,
            Either::Second(()) => return Ok(RawPulse::timed_out(triggered_at)),
        }
        let rose_at = self.clock.now();
        if rose_at >= deadline {
            return Ok(RawPulse::timed_out(triggered_at));
        }

        // falling edge: echo came back
        let wait_us = self.remaining_us(deadline);
        match select(self.echo.wait_for_falling_edge(), self.delay.delay_us(wait_us)).await {
            Either::First(edge) => edge.map_err(PulseError::Echo)?,
            Either::Second(()) => return Ok(RawPulse::timed_out(triggered_at)),
        }
        let fell_at = self.clock.now();
        if fell_at > deadline {
            return Ok(RawPulse::timed_out(triggered_at));
        }

        Ok(RawPulse::received(triggered_at, fell_at - rose_at))
    }
}
