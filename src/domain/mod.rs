//! Engine logic with no I/O: market primitives, indicators, positions,
//! ledger, replay and the strategy runner.

pub mod chart;
pub mod config_validation;
pub mod context;
pub mod error;
pub mod execution;
pub mod indicator;
pub mod ledger;
pub mod market;
pub mod metrics;
pub mod position;
pub mod replay;
pub mod runner;
pub mod strategies;
pub mod strategy;
pub mod subscription;
pub mod warmup;
