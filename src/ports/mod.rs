//! Port traits for the engine's external collaborators.

pub mod config_port;
pub mod event_source;
pub mod execution_port;
pub mod history_port;
pub mod report_port;
pub mod stream_port;
