//! Motion sentry firmware entry point
//!
//! Initializes the system and spawns the sampling, reporting and button tasks.

#![no_std]
#![no_main]

use crate::task::{
    operator_button::operator_button, report_events::report_events,
    report_status::report_status, sample_motion::sample_motion,
};
use embassy_executor::Spawner;
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use system::resources::{
    AssignedResources, OperatorButtonResources, UltrasonicDistanceSensorResources,
};
use {defmt_rtt as _, panic_probe as _};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// System core modules
mod system;
/// Task implementations
mod task;

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());

    // Split the resources into separate groups for each task
    let r = split_resources!(p);

    // Consumers first, so nothing the sampler publishes waits on them
    spawner.spawn(report_events()).unwrap();
    spawner.spawn(report_status()).unwrap();
    spawner.spawn(operator_button(r.operator_button)).unwrap();
    spawner.spawn(sample_motion(r.us_distance_sensor)).unwrap();
}
