//! Ultrasonic motion sentry
//!
//! Turns raw HC-SR04 echo timings into motion events by watching how far the
//! measured distance drifts from a slowly adapting baseline.
//!
//! # Pipeline
//! ```text
//! PulseSource -> DistanceConverter -> Smoother -> MotionDetector -> EventEmitter
//! ```
//! One [`sampler::Sampler`] drives the pipeline at a fixed period. Events leave
//! through a bounded [`event::EventQueue`] that a separate consumer task drains.
//!
//! # Ownership
//! - The trigger/echo lines belong to the pulse source
//! - Baseline and motion state belong to the detector
//! - Nothing else is shared between the sampling loop and the consumer but the queue
//!
//! The crate is `no_std`. Enable the `defmt` feature to get log output and
//! `defmt::Format` on all public types.

#![cfg_attr(not(test), no_std)]

// must stay first so the logging macros are visible to the modules below
mod fmt;

pub mod config;
pub mod detector;
pub mod distance;
pub mod error;
pub mod event;
pub mod pulse;
pub mod sampler;
pub mod smoother;

pub use config::Config;
pub use detector::{MotionDetector, MotionState};
pub use distance::{DistanceConverter, Sample};
pub use error::{ConfigError, SampleError};
pub use event::{Event, EventEmitter, EventKind, EventQueue};
pub use pulse::{Clock, Echo, Hcsr04, PulseError, PulseSource, RawPulse, SystemClock};
pub use sampler::{Command, CommandChannel, Sampler, Status, StatusBoard};
pub use smoother::{SmoothedReading, Smoother};
