//! Status report
//!
//! Logs the sampler snapshot periodically and complains while the sensor is
//! in dropout.

use defmt::{info, warn};
use embassy_time::{Duration, Timer};

use crate::system::event::status;

/// Time between reports (5s keeps the log readable next to the alerts)
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic status logger
#[embassy_executor::task]
pub async fn report_status() {
    let mut last_dropped = 0;

    loop {
        Timer::after(REPORT_INTERVAL).await;
        let status = status();

        if status.dropout {
            warn!(
                "sensor dropout: {} invalid samples so far, detection frozen",
                status.invalid_samples
            );
        }
        if status.dropped_events > last_dropped {
            warn!(
                "{} motion events lost to a full queue",
                status.dropped_events - last_dropped
            );
            last_dropped = status.dropped_events;
        }

        info!(
            "running: {}, state: {}, baseline: {} cm, reading: {}, cycles: {}",
            status.running,
            status.state,
            status.baseline_cm,
            status.last_reading.map(|r| r.value),
            status.cycles
        );
    }
}
