//! Run results.

use std::fmt;

use crate::domain::error::ErrorKind;
use crate::domain::execution::ExecutionFailure;
use crate::domain::ledger::Trade;
use crate::domain::metrics::{EquityCurve, Metrics};
use crate::domain::position::Position;
use crate::domain::replay::ReplayProperties;
use crate::domain::runner::slot::{Failure, SlotStatus};
use crate::domain::warmup::WarmupResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Backtest,
    Live,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Backtest => f.write_str("backtest"),
            RunMode::Live => f.write_str("live"),
        }
    }
}

/// A position still open at shutdown, marked to the last seen price.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub position: Position,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone)]
pub struct StrategyReport {
    pub name: String,
    pub status: SlotStatus,
    pub warmup: WarmupResult,
    pub trades: Vec<Trade>,
    pub metrics: Metrics,
    pub equity_curve: EquityCurve,
    pub open_positions: Vec<OpenPosition>,
    pub execution_failures: Vec<ExecutionFailure>,
    pub events_processed: u64,
}

impl StrategyReport {
    /// Report for a strategy whose task died outside the slot's own error
    /// handling; nothing it did is recoverable.
    pub fn aborted(name: impl Into<String>, reason: impl Into<String>, starting_equity: f64) -> Self {
        Self {
            name: name.into(),
            status: SlotStatus::Failed(Failure {
                kind: ErrorKind::Strategy,
                message: reason.into(),
                instrument: None,
                timestamp: None,
            }),
            warmup: WarmupResult::default(),
            trades: Vec::new(),
            metrics: Metrics::compute(&[], starting_equity),
            equity_curve: EquityCurve::from_trades(&[], starting_equity),
            open_positions: Vec::new(),
            execution_failures: Vec::new(),
            events_processed: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SlotStatus::Failed(_))
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.open_positions.iter().map(|p| p.unrealized_pnl).sum()
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    /// Present when the events came from a replay.
    pub replay: Option<ReplayProperties>,
    pub strategies: Vec<StrategyReport>,
    pub events_dispatched: u64,
    /// Set when the event source ended with an error.
    pub source_error: Option<String>,
}

impl RunReport {
    pub fn strategy(&self, name: &str) -> Option<&StrategyReport> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StrategyReport> {
        self.strategies.iter().filter(|s| s.is_failed())
    }
}
