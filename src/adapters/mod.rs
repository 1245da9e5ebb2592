//! Concrete implementations of the port traits.

pub mod csv_adapter;
pub mod csv_report;
pub mod file_config_adapter;
pub mod live_source;
pub mod memory_history;
pub mod simulated_gateway;
