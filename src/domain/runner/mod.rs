//! Strategy runner: owns N strategy slots and drives them from one event
//! source, synchronously for backtests ([`StrategyRunner::run_backtest`]) or
//! as cooperative tasks for live feeds ([`StrategyRunner::run_live`]).

mod backtest;
mod live;
pub mod report;
pub mod slot;

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::chart::DEFAULT_CHART_HISTORY;
use crate::domain::error::TickloomError;
use crate::domain::replay::SyntheticTicks;
use crate::domain::strategy::Strategy;
use crate::domain::subscription::{Subscription, SubscriptionRegistry};
use crate::domain::warmup::WarmupPlan;

pub use report::{OpenPosition, RunMode, RunReport, StrategyReport};
pub use slot::{Failure, OrderIntent, SlotStatus, StrategySlot};

/// Run-wide settings, built once per invocation and passed down.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub starting_equity: f64,
    /// Trades may only open at or after this instant; earlier data is warmup.
    pub evaluation_start: Option<DateTime<Utc>>,
    pub synthetic_ticks: SyntheticTicks,
    pub max_warmup_candles: usize,
    pub chart_history: usize,
    pub broadcast_capacity: usize,
    pub order_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            starting_equity: 10_000.0,
            evaluation_start: None,
            synthetic_ticks: SyntheticTicks::None,
            max_warmup_candles: 5_000,
            chart_history: DEFAULT_CHART_HISTORY,
            broadcast_capacity: 1_024,
            order_timeout: Duration::from_millis(5_000),
        }
    }
}

pub struct StrategyRunner {
    settings: EngineSettings,
    slots: Vec<StrategySlot>,
}

impl StrategyRunner {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            slots: Vec::new(),
        }
    }

    /// Construct and register one strategy instance.
    pub fn add(&mut self, strategy: Box<dyn Strategy>) -> Result<(), TickloomError> {
        if self.slots.iter().any(|s| s.name() == strategy.name()) {
            return Err(TickloomError::configuration(format!(
                "strategy name '{}' used twice",
                strategy.name()
            )));
        }
        let slot = StrategySlot::new(strategy, &self.settings)?;
        self.slots.push(slot);
        Ok(())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn plans(&self) -> Vec<&WarmupPlan> {
        self.slots.iter().map(StrategySlot::plan).collect()
    }

    /// Every feed any strategy needs, sorted.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        SubscriptionRegistry::union(self.slots.iter().map(|s| s.context().registry()))
    }

    fn into_report(self, mode: RunMode, dispatched: u64) -> RunReport {
        let starting_equity = self.settings.starting_equity;
        RunReport {
            mode,
            replay: None,
            strategies: self
                .slots
                .into_iter()
                .map(|s| s.into_report(starting_equity))
                .collect(),
            events_dispatched: dispatched,
            source_error: None,
        }
    }
}
