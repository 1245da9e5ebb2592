//! tickloom: event-driven strategy engine for candle and tick data.
//!
//! Hexagonal architecture: engine logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. The same strategy code runs in a
//! deterministic backtest and against a live feed.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
