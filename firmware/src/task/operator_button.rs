//! Operator button handling
//!
//! - Short press: recalibrate the baseline to the current distance
//! - Hold: pause sampling, or resume it when paused

use defmt::info;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Input, Level, Pull};
use embassy_time::{Duration, Timer};
use sonar_sentry::Command;

use crate::system::event::{send_command, status};
use crate::system::resources::OperatorButtonResources;

/// Button hold threshold (ms)
const HOLD_DURATION: Duration = Duration::from_millis(700);

/// Button debounce delay (ms)
const DEBOUNCE_DURATION: Duration = Duration::from_millis(30);

/// Operator button handler
#[embassy_executor::task]
pub async fn operator_button(r: OperatorButtonResources) {
    let mut btn = Input::new(r.btn, Pull::Down);

    loop {
        let init_level = debounce(&mut btn).await;

        if init_level != Level::High {
            continue;
        };

        match select(Timer::after(HOLD_DURATION), debounce(&mut btn)).await {
            Either::First(()) => {
                let command = if status().running {
                    Command::Stop
                } else {
                    Command::Start
                };
                info!("button held: {}", command);
                send_command(command).await;
                btn.wait_for_low().await;
            }
            Either::Second(_) => {
                info!("button pressed: recalibrate");
                send_command(Command::Recalibrate).await;
            }
        };
    }
}

/// Ensures stable button state
async fn debounce(button: &mut Input<'static>) -> Level {
    loop {
        let st_level = button.get_level();
        button.wait_for_any_edge().await;
        Timer::after(DEBOUNCE_DURATION).await;
        let end_level = button.get_level();
        if st_level != end_level {
            break end_level;
        }
    }
}
