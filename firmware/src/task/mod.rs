pub mod operator_button;
pub mod report_events;
pub mod report_status;
pub mod sample_motion;
