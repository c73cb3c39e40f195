//! Core system components shared by the tasks
pub mod event;
pub mod resources;
