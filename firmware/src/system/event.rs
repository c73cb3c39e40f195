//! System Channels
//!
//! Static channels connecting the sampling task with the rest of the firmware.
//!
//! - `EVENT_QUEUE`: motion events, sampling task -> event reporter
//! - `COMMANDS`: control requests, button -> sampling task
//! - `STATUS`: latest sampler snapshot, written by the sampling task only

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use sonar_sentry::{Command, CommandChannel, Event, EventQueue, Status, StatusBoard};

/// Single-producer, single-consumer motion event queue
pub static EVENT_QUEUE: EventQueue<CriticalSectionRawMutex> = EventQueue::new();

/// Control requests for the sampling loop
pub static COMMANDS: CommandChannel<CriticalSectionRawMutex> = CommandChannel::new();

/// Sampler status snapshot
pub static STATUS: StatusBoard<CriticalSectionRawMutex> = StatusBoard::new();

/// Sends a command to the sampling loop
pub async fn send_command(command: Command) {
    COMMANDS.sender().send(command).await;
}

/// Receives the next motion event
pub async fn wait_event() -> Event {
    EVENT_QUEUE.receiver().receive().await
}

/// Latest sampler status
pub fn status() -> Status {
    STATUS.read()
}
