//! CSV report writer implementing ReportPort.
//!
//! One `<strategy>_trades.csv` and one `<strategy>_summary.csv` per strategy.
//! The summary is a two-column `metric,value` table.

use std::fs;
use std::path::Path;
use tracing::info;

use crate::domain::error::TickloomError;
use crate::domain::runner::report::{RunReport, StrategyReport};
use crate::domain::runner::slot::SlotStatus;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Default)]
pub struct CsvReportWriter;

impl CsvReportWriter {
    pub fn new() -> Self {
        Self
    }
}

fn csv_err(e: csv::Error) -> TickloomError {
    TickloomError::Io(std::io::Error::from(e))
}

/// Strategy names become file name stems; anything outside `[A-Za-z0-9_-]`
/// is replaced.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_trades(strategy: &StrategyReport, path: &Path) -> Result<(), TickloomError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record([
        "instrument",
        "direction",
        "size",
        "entry_price",
        "exit_price",
        "pnl",
        "opened_at",
        "closed_at",
        "bars_held",
        "exit_reason",
    ])
    .map_err(csv_err)?;
    for t in &strategy.trades {
        wtr.write_record([
            t.instrument.clone(),
            t.direction.to_string(),
            t.size.to_string(),
            t.entry_price.to_string(),
            t.exit_price.to_string(),
            format!("{:.6}", t.pnl),
            t.opened_at.to_rfc3339(),
            t.closed_at.to_rfc3339(),
            t.bars_held.to_string(),
            t.exit_reason.to_string(),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

fn summary_rows(report: &RunReport, strategy: &StrategyReport) -> Vec<(&'static str, String)> {
    let m = &strategy.metrics;
    let mut rows = vec![
        ("mode", report.mode.to_string()),
        ("status", strategy.status.to_string()),
    ];
    if let SlotStatus::Failed(failure) = &strategy.status {
        rows.push(("failure", failure.message.clone()));
    }
    if let Some(replay) = &report.replay {
        rows.push(("synthetic_ticks", replay.synthetic_ticks.to_string()));
        rows.push((
            "evaluation_start",
            replay
                .evaluation_start
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
        ));
    }
    rows.extend([
        ("warmup_ready", strategy.warmup.all_ready().to_string()),
        ("events_processed", strategy.events_processed.to_string()),
        ("trades", m.trade_count.to_string()),
        ("won", m.trades_won.to_string()),
        ("lost", m.trades_lost.to_string()),
        ("breakeven", m.trades_breakeven.to_string()),
        ("win_rate", format!("{:.4}", m.win_rate)),
        ("avg_win", format!("{:.6}", m.avg_win)),
        ("avg_loss", format!("{:.6}", m.avg_loss)),
        ("payoff_ratio", format!("{:.4}", m.payoff_ratio)),
        ("profit_factor", format!("{:.4}", m.profit_factor)),
        ("expectancy", format!("{:.6}", m.expectancy)),
        ("total_pnl", format!("{:.6}", m.total_pnl)),
        ("starting_equity", format!("{:.2}", m.starting_equity)),
        ("ending_equity", format!("{:.2}", m.ending_equity)),
        ("max_drawdown", format!("{:.6}", m.max_drawdown)),
        ("max_drawdown_pct", format!("{:.4}", m.max_drawdown_pct)),
        ("largest_win", format!("{:.6}", m.largest_win)),
        ("largest_loss", format!("{:.6}", m.largest_loss)),
        (
            "avg_holding_seconds",
            m.avg_holding_period.num_seconds().to_string(),
        ),
        ("open_positions", strategy.open_positions.len().to_string()),
        ("unrealized_pnl", format!("{:.6}", strategy.unrealized_pnl())),
        (
            "execution_failures",
            strategy.execution_failures.len().to_string(),
        ),
    ]);
    rows
}

fn write_summary(
    report: &RunReport,
    strategy: &StrategyReport,
    path: &Path,
) -> Result<(), TickloomError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["metric", "value"]).map_err(csv_err)?;
    for (metric, value) in summary_rows(report, strategy) {
        wtr.write_record([metric, value.as_str()]).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportWriter {
    fn write(&self, report: &RunReport, output_dir: &Path) -> Result<Vec<String>, TickloomError> {
        fs::create_dir_all(output_dir)?;
        let mut written = Vec::with_capacity(report.strategies.len() * 2);
        for strategy in &report.strategies {
            let stem = file_stem(&strategy.name);
            let trades = output_dir.join(format!("{stem}_trades.csv"));
            write_trades(strategy, &trades)?;
            let summary = output_dir.join(format!("{stem}_summary.csv"));
            write_summary(report, strategy, &summary)?;
            written.push(trades.display().to_string());
            written.push(summary.display().to_string());
        }
        info!(files = written.len(), dir = %output_dir.display(), "reports written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{ExitReason, Trade};
    use crate::domain::metrics::{EquityCurve, Metrics};
    use crate::domain::position::Direction;
    use crate::domain::runner::report::RunMode;
    use crate::domain::warmup::WarmupResult;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn trade(pnl_per_unit: f64) -> Trade {
        let opened = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        Trade {
            instrument: "EURUSD".into(),
            direction: Direction::Long,
            entry_price: 1.1,
            exit_price: 1.1 + pnl_per_unit,
            size: 1.0,
            pnl: pnl_per_unit,
            opened_at: opened,
            closed_at: opened + chrono::Duration::hours(3),
            bars_held: 3,
            exit_reason: ExitReason::Signal,
        }
    }

    fn report(name: &str, trades: Vec<Trade>) -> RunReport {
        RunReport {
            mode: RunMode::Backtest,
            replay: None,
            strategies: vec![StrategyReport {
                name: name.into(),
                status: SlotStatus::Stopped,
                warmup: WarmupResult::default(),
                metrics: Metrics::compute(&trades, 1000.0),
                equity_curve: EquityCurve::from_trades(&trades, 1000.0),
                trades,
                open_positions: Vec::new(),
                execution_failures: Vec::new(),
                events_processed: 12,
            }],
            events_dispatched: 12,
            source_error: None,
        }
    }

    #[test]
    fn writes_trades_and_summary() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("reports");
        let files = CsvReportWriter::new()
            .write(&report("cross", vec![trade(0.5), trade(-0.25)]), &out)
            .unwrap();
        assert_eq!(files.len(), 2);

        let trades = fs::read_to_string(out.join("cross_trades.csv")).unwrap();
        let lines: Vec<&str> = trades.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("instrument,direction,size"));
        assert!(lines[1].contains("LONG"));

        let summary = fs::read_to_string(out.join("cross_summary.csv")).unwrap();
        assert!(summary.contains("status,stopped"));
        assert!(summary.contains("trades,2"));
        assert!(summary.contains("total_pnl,0.250000"));
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(file_stem("ma cross/eur"), "ma_cross_eur");
        assert_eq!(file_stem("mom-1_a"), "mom-1_a");
    }
}
