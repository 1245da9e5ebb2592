//! Performance metrics and equity curve, derived purely from the ledger.

use chrono::{DateTime, Duration, Utc};

use crate::domain::ledger::Trade;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Starting equity followed by one point per closed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityCurve {
    pub starting_equity: f64,
    pub points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn from_trades(trades: &[Trade], starting_equity: f64) -> Self {
        let mut equity = starting_equity;
        let points = trades
            .iter()
            .map(|t| {
                equity += t.pnl;
                EquityPoint {
                    timestamp: t.closed_at,
                    equity,
                }
            })
            .collect();
        Self {
            starting_equity,
            points,
        }
    }

    /// Equity values including the starting point.
    pub fn values(&self) -> Vec<f64> {
        std::iter::once(self.starting_equity)
            .chain(self.points.iter().map(|p| p.equity))
            .collect()
    }

    pub fn ending_equity(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.starting_equity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub trade_count: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// avg_win / avg_loss
    pub payoff_ratio: f64,
    pub profit_factor: f64,
    /// Mean pnl per trade.
    pub expectancy: f64,
    pub total_pnl: f64,
    pub starting_equity: f64,
    pub ending_equity: f64,
    /// Largest peak-to-trough decline, in account currency.
    pub max_drawdown: f64,
    /// The same decline as a fraction of its peak.
    pub max_drawdown_pct: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_period: Duration,
}

impl Metrics {
    pub fn compute(trades: &[Trade], starting_equity: f64) -> Self {
        let curve = EquityCurve::from_trades(trades, starting_equity);
        let (max_drawdown, max_drawdown_pct) = compute_drawdown(&curve.values());

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_holding = Duration::zero();

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_holding += trade.closed_at - trade.opened_at;
        }

        let trade_count = trades.len();
        let win_rate = ratio(trades_won as f64, trade_count as f64);
        let avg_win = ratio(total_wins, trades_won as f64);
        let avg_loss = ratio(total_losses, trades_lost as f64);

        let payoff_ratio = if avg_loss > 0.0 {
            avg_win / avg_loss
        } else if avg_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let avg_holding_period = if trade_count > 0 {
            total_holding / trade_count as i32
        } else {
            Duration::zero()
        };

        Metrics {
            trade_count,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            avg_win,
            avg_loss,
            payoff_ratio,
            profit_factor,
            expectancy: ratio(total_pnl, trade_count as f64),
            total_pnl,
            starting_equity,
            ending_equity: curve.ending_equity(),
            max_drawdown,
            max_drawdown_pct,
            largest_win,
            largest_loss,
            avg_holding_period,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// (absolute, fraction of peak) of the largest decline.
fn compute_drawdown(equity: &[f64]) -> (f64, f64) {
    let Some(&first) = equity.first() else {
        return (0.0, 0.0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;

    for &value in equity {
        if value > peak {
            peak = value;
            continue;
        }
        let dd = peak - value;
        if dd > max_dd {
            max_dd = dd;
            max_dd_pct = if peak > 0.0 { dd / peak } else { 0.0 };
        }
    }

    (max_dd, max_dd_pct)
}
