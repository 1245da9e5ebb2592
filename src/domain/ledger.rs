//! Append-only trade ledger.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::error::TickloomError;
use crate::domain::metrics::{EquityCurve, Metrics};
use crate::domain::position::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// The strategy asked to exit.
    Signal,
    PriceStop,
    TimeStop,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::PriceStop => "price_stop",
            ExitReason::TimeStop => "time_stop",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed position. Written once, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub bars_held: u64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    evaluation_start: Option<DateTime<Utc>>,
    trades: Vec<Trade>,
}

impl Ledger {
    pub fn new(evaluation_start: Option<DateTime<Utc>>) -> Self {
        Self {
            evaluation_start,
            trades: Vec::new(),
        }
    }

    /// Append a trade. Trades opened before the evaluation window would mean
    /// warmup leaked into trading and are refused.
    pub fn record(&mut self, trade: Trade) -> Result<(), TickloomError> {
        if let Some(start) = self.evaluation_start {
            if trade.opened_at < start {
                return Err(TickloomError::invariant(
                    &trade.instrument,
                    trade.opened_at,
                    format!(
                        "trade opened before evaluation start {}",
                        start.to_rfc3339()
                    ),
                ));
            }
        }
        if trade.closed_at < trade.opened_at {
            return Err(TickloomError::invariant(
                &trade.instrument,
                trade.closed_at,
                "trade closed before it was opened",
            ));
        }
        self.trades.push(trade);
        Ok(())
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn evaluation_start(&self) -> Option<DateTime<Utc>> {
        self.evaluation_start
    }

    pub fn metrics(&self, starting_equity: f64) -> Metrics {
        Metrics::compute(&self.trades, starting_equity)
    }

    pub fn equity_curve(&self, starting_equity: f64) -> EquityCurve {
        EquityCurve::from_trades(&self.trades, starting_equity)
    }
}
