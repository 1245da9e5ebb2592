//! Configuration validation.
//!
//! Validates every section before any data is loaded and turns the raw INI
//! values into typed settings. Sections:
//!
//! - `[engine]`: run-wide settings, all optional.
//! - `[data]`: CSV directory and bar timestamp convention.
//! - `[strategy.<id>]`: one strategy instance each.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::TickloomError;
use crate::domain::market::Timeframe;
use crate::domain::replay::SyntheticTicks;
use crate::domain::runner::EngineSettings;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_SECTION_PREFIX: &str = "strategy.";

/// Which instant a CSV candle timestamp denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarTimestamps {
    /// Bar completion time; used as is.
    #[default]
    Close,
    /// Bar start time; shifted forward by one timeframe on load.
    Open,
}

impl FromStr for BarTimestamps {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" => Ok(BarTimestamps::Close),
            "open" => Ok(BarTimestamps::Open),
            other => Err(format!("expected close or open, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSettings {
    pub dir: Option<String>,
    pub bar_timestamps: BarTimestamps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MaCross,
    Momentum,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::MaCross => f.write_str("ma_cross"),
            StrategyKind::Momentum => f.write_str("momentum"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ma_cross" => Ok(StrategyKind::MaCross),
            "momentum" => Ok(StrategyKind::Momentum),
            other => Err(format!("unknown strategy kind '{other}'")),
        }
    }
}

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum KindParams {
    MaCross {
        fast: usize,
        slow: usize,
        atr_period: usize,
        atr_multiple: f64,
    },
    Momentum {
        lookback: usize,
        threshold_pct: f64,
        stop_pct: f64,
    },
}

/// A validated `[strategy.<id>]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySpec {
    pub id: String,
    pub kind: StrategyKind,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub size: f64,
    pub max_hold_bars: Option<u64>,
    pub warmup_margin: usize,
    pub params: KindParams,
}

/// Everything a run needs from the configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub engine: EngineSettings,
    pub data: DataSettings,
    pub strategies: Vec<StrategySpec>,
}

/// Validate the whole file. Backtests additionally need `[data] dir`.
pub fn validate_run_config(config: &dyn ConfigPort, needs_data: bool) -> Result<RunConfig, TickloomError> {
    let engine = engine_settings(config)?;
    let data = data_settings(config)?;
    if needs_data && data.dir.is_none() {
        return Err(TickloomError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        });
    }
    let strategies = strategy_specs(config)?;
    Ok(RunConfig {
        engine,
        data,
        strategies,
    })
}

pub fn engine_settings(config: &dyn ConfigPort) -> Result<EngineSettings, TickloomError> {
    let defaults = EngineSettings::default();

    let starting_equity = parse_or(config, "engine", "starting_equity", defaults.starting_equity)?;
    if !starting_equity.is_finite() || starting_equity <= 0.0 {
        return Err(invalid("engine", "starting_equity", "starting_equity must be positive"));
    }

    let evaluation_start = match non_empty(config, "engine", "evaluation_start") {
        None => None,
        Some(s) => Some(
            parse_timestamp(&s)
                .ok_or_else(|| invalid("engine", "evaluation_start", "expected an ISO-8601 UTC timestamp or YYYY-MM-DD"))?,
        ),
    };

    let synthetic_ticks = match non_empty(config, "engine", "synthetic_ticks") {
        None => defaults.synthetic_ticks,
        Some(s) => s
            .parse::<SyntheticTicks>()
            .map_err(|e| invalid("engine", "synthetic_ticks", e.to_string()))?,
    };

    let max_warmup_candles = parse_or(config, "engine", "max_warmup_candles", defaults.max_warmup_candles)?;

    let chart_history = parse_or(config, "engine", "chart_history", defaults.chart_history)?;
    if chart_history == 0 {
        return Err(invalid("engine", "chart_history", "chart_history must be at least 1"));
    }

    let broadcast_capacity = parse_or(config, "engine", "broadcast_capacity", defaults.broadcast_capacity)?;
    if broadcast_capacity == 0 {
        return Err(invalid("engine", "broadcast_capacity", "broadcast_capacity must be at least 1"));
    }

    let timeout_ms: u64 = parse_or(
        config,
        "engine",
        "order_timeout_ms",
        defaults.order_timeout.as_millis() as u64,
    )?;
    if timeout_ms == 0 {
        return Err(invalid("engine", "order_timeout_ms", "order_timeout_ms must be at least 1"));
    }

    Ok(EngineSettings {
        starting_equity,
        evaluation_start,
        synthetic_ticks,
        max_warmup_candles,
        chart_history,
        broadcast_capacity,
        order_timeout: Duration::from_millis(timeout_ms),
    })
}

pub fn data_settings(config: &dyn ConfigPort) -> Result<DataSettings, TickloomError> {
    let bar_timestamps = match non_empty(config, "data", "bar_timestamps") {
        None => BarTimestamps::default(),
        Some(s) => s
            .parse::<BarTimestamps>()
            .map_err(|e| invalid("data", "bar_timestamps", e))?,
    };
    Ok(DataSettings {
        dir: non_empty(config, "data", "dir"),
        bar_timestamps,
    })
}

/// All `[strategy.<id>]` sections, sorted by id. At least one is required.
pub fn strategy_specs(config: &dyn ConfigPort) -> Result<Vec<StrategySpec>, TickloomError> {
    let mut sections: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(STRATEGY_SECTION_PREFIX))
        .collect();
    sections.sort();
    if sections.is_empty() {
        return Err(TickloomError::ConfigMissing {
            section: "strategy.<id>".to_string(),
            key: "kind".to_string(),
        });
    }
    sections
        .iter()
        .map(|section| strategy_spec(config, section))
        .collect()
}

fn strategy_spec(config: &dyn ConfigPort, section: &str) -> Result<StrategySpec, TickloomError> {
    let id = section.trim_start_matches(STRATEGY_SECTION_PREFIX).to_string();
    if id.is_empty() {
        return Err(invalid(section, "kind", "strategy section needs an id after 'strategy.'"));
    }

    let kind: StrategyKind = required(config, section, "kind")?;
    let instrument: String = required(config, section, "instrument")?;
    let timeframe: Timeframe = required(config, section, "timeframe")?;

    let size: f64 = parse_or(config, section, "size", 1.0)?;
    if !size.is_finite() || size <= 0.0 {
        return Err(invalid(section, "size", "size must be positive"));
    }

    let max_hold_bars: Option<u64> = parse_opt(config, section, "max_hold_bars")?;
    if max_hold_bars == Some(0) {
        return Err(invalid(section, "max_hold_bars", "max_hold_bars must be at least 1"));
    }
    let warmup_margin = parse_or(config, section, "warmup_margin", 0usize)?;

    let params = match kind {
        StrategyKind::MaCross => {
            let fast = positive_period(config, section, "fast", 10)?;
            let slow = positive_period(config, section, "slow", 30)?;
            if fast >= slow {
                return Err(invalid(section, "fast", "fast must be shorter than slow"));
            }
            let atr_period = positive_period(config, section, "atr_period", 14)?;
            let atr_multiple: f64 = parse_or(config, section, "atr_multiple", 2.0)?;
            if !atr_multiple.is_finite() || atr_multiple <= 0.0 {
                return Err(invalid(section, "atr_multiple", "atr_multiple must be positive"));
            }
            KindParams::MaCross {
                fast,
                slow,
                atr_period,
                atr_multiple,
            }
        }
        StrategyKind::Momentum => {
            let lookback = positive_period(config, section, "lookback", 10)?;
            let threshold_pct: f64 = parse_or(config, section, "threshold_pct", 0.1)?;
            if !threshold_pct.is_finite() || threshold_pct < 0.0 {
                return Err(invalid(section, "threshold_pct", "threshold_pct must be non-negative"));
            }
            let stop_pct: f64 = parse_or(config, section, "stop_pct", 1.0)?;
            if !stop_pct.is_finite() || stop_pct <= 0.0 || stop_pct >= 100.0 {
                return Err(invalid(section, "stop_pct", "stop_pct must be between 0 and 100"));
            }
            KindParams::Momentum {
                lookback,
                threshold_pct,
                stop_pct,
            }
        }
    };

    Ok(StrategySpec {
        id,
        kind,
        instrument,
        timeframe,
        size,
        max_hold_bars,
        warmup_margin,
        params,
    })
}

/// `YYYY-MM-DDTHH:MM:SS[Z|+00:00]`, the same without the zone, or a bare date.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TickloomError {
    TickloomError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_opt<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, TickloomError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, format!("'{s}': {e}"))),
    }
}

fn parse_or<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, TickloomError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(parse_opt(config, section, key)?.unwrap_or(default))
}

fn required<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, TickloomError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_opt(config, section, key)?.ok_or_else(|| TickloomError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn positive_period(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TickloomError> {
    let value = parse_or(config, section, key, default)?;
    if value == 0 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(value)
}
