//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report::CsvReportWriter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::simulated_gateway::SimulatedGateway;
use crate::domain::config_validation::{validate_run_config, RunConfig};
use crate::domain::error::TickloomError;
use crate::domain::runner::{RunReport, SlotStatus, StrategyReport, StrategyRunner};
use crate::domain::strategies;
use crate::logging;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "tickloom", about = "Event-driven strategy engine for candle and tick data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay CSV data through the configured strategies
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for per-strategy trade and summary CSVs
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Validate a configuration file without loading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print each strategy's warmup plan
    Plan {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            log_level,
        } => {
            logging::init(&log_level);
            run_backtest(&config, output.as_deref())
        }
        Command::Validate { config } => {
            logging::init("warn");
            run_validate(&config)
        }
        Command::Plan { config } => {
            logging::init("warn");
            run_plan(&config)
        }
    }
}

fn fail(err: &TickloomError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<RunConfig, TickloomError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_run_config(&adapter, false)
}

/// Construct, register and validate every configured strategy.
pub fn build_runner(config: &RunConfig) -> Result<StrategyRunner, TickloomError> {
    let mut runner = StrategyRunner::new(config.engine.clone());
    for spec in &config.strategies {
        runner.add(strategies::build(spec))?;
    }
    Ok(runner)
}

/// Load the CSV feeds the strategies subscribe to and replay them through
/// a simulated gateway.
pub fn run_backtest_pipeline(config: &RunConfig) -> Result<RunReport, TickloomError> {
    let dir = config
        .data
        .dir
        .as_ref()
        .ok_or_else(|| TickloomError::ConfigMissing {
            section: "data".into(),
            key: "dir".into(),
        })?;
    let runner = build_runner(config)?;
    let csv = CsvAdapter::new(dir, config.data.bar_timestamps);
    let data = csv.replay_data(&runner.subscriptions(), config.engine.synthetic_ticks)?;
    let gateway = SimulatedGateway::new();
    info!(strategies = runner.len(), dir = %dir, "starting backtest");
    Ok(runner.run_backtest(&data, &gateway))
}

pub fn format_summary(report: &StrategyReport) -> String {
    let m = &report.metrics;
    let mut out = format!("=== {} ({}) ===\n", report.name, report.status);
    if let SlotStatus::Failed(failure) = &report.status {
        out.push_str(&format!("Failure:          {}\n", failure.message));
    }
    if !report.warmup.all_ready() {
        for w in report.warmup.not_ready() {
            out.push_str(&format!(
                "Warmup not ready: {} ({}/{})\n",
                w.subscription, w.received, w.required
            ));
        }
    }
    out.push_str(&format!("Trades:           {}\n", m.trade_count));
    out.push_str(&format!("Win Rate:         {:.1}%\n", m.win_rate * 100.0));
    out.push_str(&format!("Payoff Ratio:     {:.2}\n", m.payoff_ratio));
    out.push_str(&format!("Profit Factor:    {:.2}\n", m.profit_factor));
    out.push_str(&format!("Expectancy:       {:.5}\n", m.expectancy));
    out.push_str(&format!("Total PnL:        {:.5}\n", m.total_pnl));
    out.push_str(&format!(
        "Max Drawdown:     {:.5} ({:.2}%)\n",
        m.max_drawdown,
        m.max_drawdown_pct * 100.0
    ));
    out.push_str(&format!(
        "Avg Holding:      {}m\n",
        m.avg_holding_period.num_minutes()
    ));
    if !report.open_positions.is_empty() {
        out.push_str(&format!(
            "Open Positions:   {} (unrealized {:.5})\n",
            report.open_positions.len(),
            report.unrealized_pnl()
        ));
    }
    if !report.execution_failures.is_empty() {
        out.push_str(&format!(
            "Rejected Orders:  {}\n",
            report.execution_failures.len()
        ));
    }
    out
}

/// First failed strategy decides the exit code.
pub fn exit_code(report: &RunReport) -> ExitCode {
    match report.failed().next().map(|s| &s.status) {
        Some(SlotStatus::Failed(failure)) => failure.kind.into(),
        _ => ExitCode::SUCCESS,
    }
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let report = match run_backtest_pipeline(&config) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    if let Some(replay) = &report.replay {
        eprintln!(
            "Replayed {} events (synthetic ticks: {})",
            report.events_dispatched, replay.synthetic_ticks
        );
    }
    for strategy in &report.strategies {
        println!("{}", format_summary(strategy));
    }

    if let Some(dir) = output {
        match CsvReportWriter::new().write(&report, dir) {
            Ok(files) => {
                for f in files {
                    eprintln!("Report written to: {f}");
                }
            }
            Err(e) => return fail(&e),
        }
    }
    exit_code(&report)
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let result = load_config(config_path).and_then(|c| build_runner(&c).map(|r| (c, r)));
    match result {
        Ok((config, runner)) => {
            for spec in &config.strategies {
                eprintln!(
                    "  {}: {} on {} {}",
                    spec.id, spec.kind, spec.instrument, spec.timeframe
                );
            }
            if config.data.dir.is_none() {
                eprintln!("warning: [data] dir is not set, backtest will refuse to run");
            }
            eprintln!("\n{} strategies, configuration is valid.", runner.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_plan(config_path: &Path) -> ExitCode {
    let runner = match load_config(config_path).and_then(|c| build_runner(&c)) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    for plan in runner.plans() {
        println!("{}", plan.strategy);
        if plan.requests.is_empty() {
            println!("  (no chart subscriptions)");
        }
        for req in &plan.requests {
            println!(
                "  {}: {} candles (indicators {} + margin {})",
                req.subscription, req.required, req.indicator_periods, req.margin
            );
        }
    }
    ExitCode::SUCCESS
}
