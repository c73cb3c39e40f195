//! Alert log
//!
//! Drains the motion event queue and logs every event. This is the only
//! consumer of the queue.

use defmt::{info, warn};
use sonar_sentry::EventKind;

use crate::system::event::wait_event;

/// Logs motion alerts as they arrive
#[embassy_executor::task]
pub async fn report_events() {
    let mut detections: u32 = 0;

    loop {
        let event = wait_event().await;
        match event.kind {
            EventKind::MotionDetected => {
                detections = detections.wrapping_add(1);
                warn!(
                    "Alert! Motion #{} at {}: distance changed by {} cm",
                    detections, event.timestamp, event.distance_delta
                );
            }
            EventKind::MotionCleared => {
                info!(
                    "motion cleared at {} ({} cm from baseline)",
                    event.timestamp, event.distance_delta
                );
            }
        }
    }
}
