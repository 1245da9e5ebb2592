//! Per-strategy run context.
//!
//! Owns everything one strategy instance can observe: its subscriptions,
//! chart histories, indicators, one position state machine per subscribed
//! instrument and its parameters. A context belongs to exactly one runner
//! slot; strategies get `&mut` access only while registering and `&` access
//! during dispatch.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::chart::ChartHistory;
use crate::domain::error::TickloomError;
use crate::domain::indicator::{Indicator, IndicatorHandle, IndicatorHost, IndicatorValue};
use crate::domain::market::{Candle, CandleClose, Timeframe};
use crate::domain::position::{Position, PositionStateMachine};
use crate::domain::strategy::StrategyParams;
use crate::domain::subscription::{Subscription, SubscriptionRegistry};

#[derive(Debug)]
pub struct StrategyContext {
    name: String,
    params: StrategyParams,
    registry: SubscriptionRegistry,
    indicators: IndicatorHost,
    charts: BTreeMap<Subscription, ChartHistory>,
    positions: BTreeMap<String, PositionStateMachine>,
    bar_index: BTreeMap<String, u64>,
    last_price: BTreeMap<String, f64>,
    now: Option<DateTime<Utc>>,
}

impl StrategyContext {
    pub fn new(
        name: impl Into<String>,
        params: StrategyParams,
        registry: SubscriptionRegistry,
        chart_history: usize,
    ) -> Self {
        let charts = registry
            .charts()
            .filter_map(|sub| {
                let timeframe = sub.timeframe()?;
                Some((
                    sub.clone(),
                    ChartHistory::new(sub.instrument.clone(), timeframe, chart_history),
                ))
            })
            .collect();
        let positions = registry
            .instruments()
            .into_iter()
            .map(|i| (i.clone(), PositionStateMachine::new(i)))
            .collect();
        Self {
            name: name.into(),
            params,
            registry,
            indicators: IndicatorHost::new(),
            charts,
            positions,
            bar_index: BTreeMap::new(),
            last_price: BTreeMap::new(),
            now: None,
        }
    }

    /// Register an indicator on one of this strategy's chart subscriptions.
    pub fn register_indicator(
        &mut self,
        subscription: &Subscription,
        indicator: Box<dyn Indicator>,
    ) -> Result<IndicatorHandle, TickloomError> {
        if !subscription.is_chart() || !self.registry.contains(subscription) {
            return Err(TickloomError::configuration(format!(
                "strategy '{}' registered {} on {subscription}, which is not one of its chart subscriptions",
                self.name,
                indicator.label()
            )));
        }
        Ok(self.indicators.register(subscription.clone(), indicator))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Timestamp of the event being dispatched.
    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.now
    }

    /// Value of a ready indicator; `None` while it is warming up.
    pub fn indicator(&self, handle: IndicatorHandle) -> Option<&IndicatorValue> {
        self.indicators.value(handle)
    }

    /// Scalar value of a ready single-output indicator.
    pub fn indicator_value(&self, handle: IndicatorHandle) -> Option<f64> {
        self.indicator(handle).and_then(IndicatorValue::as_simple)
    }

    pub fn indicators(&self) -> &IndicatorHost {
        &self.indicators
    }

    pub fn chart(&self, instrument: &str, timeframe: Timeframe) -> Option<&ChartHistory> {
        self.charts.get(&Subscription::chart(instrument, timeframe))
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument).and_then(|p| p.position())
    }

    pub fn is_flat(&self, instrument: &str) -> bool {
        self.position(instrument).is_none()
    }

    /// Every open position, ordered by instrument.
    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().filter_map(|p| p.position()).collect()
    }

    pub fn last_price(&self, instrument: &str) -> Option<f64> {
        self.last_price.get(instrument).copied()
    }

    /// Completed candles seen for `instrument` since dispatch began.
    pub fn bar_index(&self, instrument: &str) -> u64 {
        self.bar_index.get(instrument).copied().unwrap_or(0)
    }

    pub(crate) fn position_machine_mut(
        &mut self,
        instrument: &str,
    ) -> Option<&mut PositionStateMachine> {
        self.positions.get_mut(instrument)
    }

    pub(crate) fn position_machine(&self, instrument: &str) -> Option<&PositionStateMachine> {
        self.positions.get(instrument)
    }

    pub(crate) fn set_now(&mut self, at: DateTime<Utc>) {
        self.now = Some(at);
    }

    pub(crate) fn mark(&mut self, instrument: &str, price: f64) {
        self.last_price.insert(instrument.to_string(), price);
    }

    /// Feed a historical candle to chart history and indicators only.
    pub(crate) fn prime(&mut self, subscription: &Subscription, candle: &Candle) {
        if let Some(chart) = self.charts.get_mut(subscription) {
            chart.add_candle(candle.clone());
        }
        self.indicators.update(subscription, candle);
        self.last_price
            .insert(subscription.instrument.clone(), candle.close);
    }

    /// Apply a live or replayed candle close: chart history, indicators in
    /// registration order, then the instrument's bar counter. Returns the
    /// new bar index.
    pub(crate) fn apply_candle(&mut self, event: &CandleClose) -> u64 {
        let subscription = Subscription::chart(event.instrument.clone(), event.timeframe);
        self.prime(&subscription, &event.candle);
        let index = self.bar_index.entry(event.instrument.clone()).or_insert(0);
        *index += 1;
        *index
    }
}
