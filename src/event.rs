//! Motion events
//!
//! Defines the events leaving the detector and the queue carrying them to the
//! consumer task.
//!
//! # Delivery
//! - Single producer (the sampling loop), single consumer
//! - FIFO, so events arrive in the order they were produced
//! - Publishing never waits: when the queue is full the oldest unconsumed
//!   event is dropped and counted, the sampling loop keeps its timing

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::Instant;

/// Events buffered between the sampling loop and the consumer
pub const EVENT_QUEUE_DEPTH: usize = 10;

/// Queue between the sampling loop and the consumer
pub type EventQueue<M> = Channel<M, Event, EVENT_QUEUE_DEPTH>;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Distance moved away from the baseline and stayed there
    MotionDetected,
    /// Distance settled back near the baseline after the cooldown
    MotionCleared,
}

/// Motion state change
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    /// Detected or cleared
    pub kind: EventKind,
    /// Timestamp of the cycle that caused the transition
    pub timestamp: Instant,
    /// Smoothed distance minus baseline, in cm (negative: something came closer)
    pub distance_delta: f32,
}

impl Event {
    /// Motion started
    pub const fn detected(timestamp: Instant, distance_delta: f32) -> Self {
        Self {
            kind: EventKind::MotionDetected,
            timestamp,
            distance_delta,
        }
    }

    /// Motion ended
    pub const fn cleared(timestamp: Instant, distance_delta: f32) -> Self {
        Self {
            kind: EventKind::MotionCleared,
            timestamp,
            distance_delta,
        }
    }
}

/// Non-blocking publisher with drop-oldest overflow
pub struct EventEmitter<'a, M: RawMutex, const N: usize> {
    queue: &'a Channel<M, Event, N>,
    dropped: u32,
}

impl<'a, M: RawMutex, const N: usize> EventEmitter<'a, M, N> {
    /// Publisher into `queue`. Must be the queue's only producer.
    pub fn new(queue: &'a Channel<M, Event, N>) -> Self {
        Self { queue, dropped: 0 }
    }

    /// Queues `event`, evicting the oldest queued one if the consumer fell behind
    pub fn publish(&mut self, event: Event) {
        let Err(TrySendError::Full(event)) = self.queue.try_send(event) else {
            return;
        };

        if let Ok(evicted) = self.queue.try_receive() {
            self.dropped = self.dropped.saturating_add(1);
            warn!(
                "event queue full, dropped {} from {} ({} dropped so far)",
                evicted.kind,
                evicted.timestamp,
                self.dropped
            );
        }
        // the consumer may only have made room, never taken it away
        if self.queue.try_send(event).is_err() {
            self.dropped = self.dropped.saturating_add(1);
            warn!("event queue still full, dropped {}", event.kind);
        }
    }

    /// Events lost to overflow
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn event(ms: u64) -> Event {
        Event::detected(Instant::from_millis(ms), -70.0)
    }

    #[test]
    fn delivers_in_order() {
        let queue: Channel<NoopRawMutex, Event, 4> = Channel::new();
        let mut emitter = EventEmitter::new(&queue);

        emitter.publish(event(1));
        emitter.publish(Event::cleared(Instant::from_millis(2), 1.0));

        assert_eq!(queue.try_receive(), Ok(event(1)));
        assert_eq!(
            queue.try_receive().map(|e| e.kind),
            Ok(EventKind::MotionCleared)
        );
        assert!(queue.try_receive().is_err());
        assert_eq!(emitter.dropped(), 0);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let queue: Channel<NoopRawMutex, Event, 2> = Channel::new();
        let mut emitter = EventEmitter::new(&queue);

        for ms in 1..=5 {
            emitter.publish(event(ms));
        }

        assert_eq!(emitter.dropped(), 3);
        assert_eq!(queue.try_receive(), Ok(event(4)));
        assert_eq!(queue.try_receive(), Ok(event(5)));
    }

    #[test]
    fn consumer_catching_up_stops_drops() {
        let queue: Channel<NoopRawMutex, Event, 2> = Channel::new();
        let mut emitter = EventEmitter::new(&queue);

        emitter.publish(event(1));
        emitter.publish(event(2));
        assert_eq!(queue.try_receive(), Ok(event(1)));
        emitter.publish(event(3));

        assert_eq!(emitter.dropped(), 0);
        assert_eq!(queue.try_receive(), Ok(event(2)));
        assert_eq!(queue.try_receive(), Ok(event(3)));
    }
}
