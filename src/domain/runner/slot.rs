//! One strategy instance inside a runner.
//!
//! The per-event path is identical in backtest and live mode:
//!
//! 1. [`StrategySlot::begin`] marks the price, feeds candles to chart
//!    history and indicators, advances the bar counter and checks forced
//!    exits (price stop before time stop).
//! 2. [`StrategySlot::decide`] calls the strategy and turns its signals into
//!    authorized [`OrderIntent`]s.
//! 3. The driver places each intent that [`StrategySlot::admit`] lets
//!    through and hands the outcome to [`StrategySlot::settle`], the only
//!    place position state changes.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

use crate::domain::context::StrategyContext;
use crate::domain::error::{ErrorKind, TickloomError};
use crate::domain::execution::{DealReference, ExecutionFailure, OrderPurpose, OrderRequest};
use crate::domain::ledger::{ExitReason, Ledger};
use crate::domain::market::MarketEvent;
use crate::domain::position::Direction;
use crate::domain::replay::CandleHistory;
use crate::domain::runner::EngineSettings;
use crate::domain::runner::report::{OpenPosition, StrategyReport};
use crate::domain::strategy::{Signal, Strategy};
use crate::domain::subscription::SubscriptionRegistry;
use crate::domain::warmup::{self, WarmupPlan, WarmupResult};
use crate::ports::history_port::HistoricalDataProvider;

/// Why a slot stopped processing.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub instrument: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&TickloomError> for Failure {
    fn from(err: &TickloomError) -> Self {
        let (instrument, timestamp) = match err.context() {
            Some((i, ts)) => (Some(i.to_string()), ts),
            None => (None, None),
        };
        Failure {
            kind: err.kind(),
            message: err.to_string(),
            instrument,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotStatus {
    Running,
    Stopped,
    Failed(Failure),
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Running => f.write_str("running"),
            SlotStatus::Stopped => f.write_str("stopped"),
            SlotStatus::Failed(_) => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum IntentAction {
    Open {
        direction: Direction,
        entry_price: f64,
        stop_price: f64,
    },
    Close {
        reason: ExitReason,
        fill_price: f64,
    },
}

/// An authorized order waiting for the gateway's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub request: OrderRequest,
    action: IntentAction,
}

pub struct StrategySlot {
    strategy: Box<dyn Strategy>,
    ctx: StrategyContext,
    ledger: Ledger,
    plan: WarmupPlan,
    warmup: WarmupResult,
    status: SlotStatus,
    execution_failures: Vec<ExecutionFailure>,
    /// Instruments with a failed order during the current event.
    refused: BTreeSet<String>,
    events: u64,
}

impl StrategySlot {
    /// Construct, register and validate a strategy. Every configuration
    /// problem surfaces here, before any event is dispatched.
    pub fn new(
        mut strategy: Box<dyn Strategy>,
        settings: &EngineSettings,
    ) -> Result<Self, TickloomError> {
        let name = strategy.name().to_string();
        let registry = SubscriptionRegistry::new(strategy.subscriptions()).map_err(|e| {
            TickloomError::configuration(format!("strategy '{name}': {e}"))
        })?;
        if registry.is_empty() {
            warn!(strategy = %name, "strategy has no subscriptions and will never see an event");
        }

        let params = strategy.params();
        if !params.size.is_finite() || params.size <= 0.0 {
            return Err(TickloomError::configuration(format!(
                "strategy '{name}': size must be positive, got {}",
                params.size
            )));
        }
        if let Some(max) = params.max_hold_bars {
            if max == 0 {
                return Err(TickloomError::configuration(format!(
                    "strategy '{name}': max_hold_bars must be at least 1"
                )));
            }
            let ambiguous = registry.instruments_with_multiple_charts();
            if !ambiguous.is_empty() {
                return Err(TickloomError::configuration(format!(
                    "strategy '{name}': time stop is ambiguous with several chart timeframes on {}",
                    ambiguous.join(", ")
                )));
            }
        }

        let mut ctx = StrategyContext::new(&name, params, registry, settings.chart_history);
        match panic::catch_unwind(AssertUnwindSafe(|| strategy.register(&mut ctx))) {
            Ok(result) => result?,
            Err(payload) => {
                return Err(TickloomError::configuration(format!(
                    "strategy '{name}' panicked during registration: {}",
                    panic_message(payload.as_ref())
                )));
            }
        }

        let plan = WarmupPlan::for_context(&ctx, strategy.warmup_margin(), settings.max_warmup_candles)?;
        info!(
            strategy = %name,
            subscriptions = ctx.registry().iter().count(),
            indicators = ctx.indicators().len(),
            "strategy registered"
        );

        Ok(Self {
            strategy,
            ctx,
            ledger: Ledger::new(settings.evaluation_start),
            plan,
            warmup: WarmupResult::default(),
            status: SlotStatus::Running,
            execution_failures: Vec::new(),
            refused: BTreeSet::new(),
            events: 0,
        })
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn status(&self) -> &SlotStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, SlotStatus::Running)
    }

    pub fn context(&self) -> &StrategyContext {
        &self.ctx
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn plan(&self) -> &WarmupPlan {
        &self.plan
    }

    pub fn warm_from_history(&mut self, history: &CandleHistory) {
        self.warmup = warmup::warmup_from_history(&mut self.ctx, &self.plan, history);
    }

    pub async fn warm_from_provider(&mut self, provider: &dyn HistoricalDataProvider) {
        self.warmup = warmup::warmup_from_provider(&mut self.ctx, &self.plan, provider).await;
    }

    /// Whether this slot should see `event`.
    pub fn accepts(&self, event: &MarketEvent) -> bool {
        self.is_running() && self.ctx.registry().matches(event)
    }

    /// Phase 1: state updates and forced exits.
    pub fn begin(&mut self, event: &MarketEvent) -> Vec<OrderIntent> {
        self.refused.clear();
        if !self.accepts(event) {
            return Vec::new();
        }
        self.events += 1;
        let at = event.timestamp();
        let instrument = event.instrument().to_string();
        self.ctx.set_now(at);
        self.ctx.mark(&instrument, event.mark_price());

        let forced = match event {
            MarketEvent::CandleClose(close) => {
                let bar = self.ctx.apply_candle(close);
                let bar_open = close.candle.timestamp - close.timeframe.duration();
                let max_hold = self.ctx.params().max_hold_bars;
                self.ctx
                    .position_machine(&instrument)
                    .and_then(|psm| psm.check_candle(&close.candle, bar_open, bar, max_hold))
            }
            MarketEvent::Tick(tick) => self
                .ctx
                .position_machine(&instrument)
                .and_then(|psm| psm.check_tick(tick)),
        };

        let Some(exit) = forced else {
            return Vec::new();
        };
        let Some(position) = self.ctx.position(&instrument) else {
            return Vec::new();
        };
        debug!(
            strategy = self.name(),
            %instrument,
            reason = %exit.reason,
            fill = exit.fill_price,
            "forced exit triggered"
        );
        vec![OrderIntent {
            request: OrderRequest {
                instrument,
                direction: opposite(position.direction),
                size: position.size,
                purpose: OrderPurpose::Exit(exit.reason),
                timestamp: at,
            },
            action: IntentAction::Close {
                reason: exit.reason,
                fill_price: exit.fill_price,
            },
        }]
    }

    /// Phase 2: strategy callback and signal authorization. Any error or
    /// panic fails this slot and yields no intents.
    pub fn decide(&mut self, event: &MarketEvent) -> Vec<OrderIntent> {
        if !self.accepts(event) {
            return Vec::new();
        }
        let at = event.timestamp();
        let strategy = &mut self.strategy;
        let ctx = &self.ctx;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
            MarketEvent::Tick(tick) => strategy.on_tick(tick, ctx),
            MarketEvent::CandleClose(close) => strategy.on_candle_close(close, ctx),
        }));

        let signals = match outcome {
            Ok(Ok(signals)) => signals,
            Ok(Err(e)) => {
                self.fail(e);
                return Vec::new();
            }
            Err(payload) => {
                let err = TickloomError::strategy(
                    event.instrument(),
                    at,
                    format!("strategy panicked: {}", panic_message(payload.as_ref())),
                );
                self.fail(err);
                return Vec::new();
            }
        };

        let mut projected: BTreeMap<String, Option<(Direction, f64)>> = BTreeMap::new();
        let mut intents = Vec::with_capacity(signals.len());
        for signal in signals {
            match self.authorize(signal, event, &mut projected) {
                Ok(Some(intent)) => intents.push(intent),
                Ok(None) => {}
                Err(e) => {
                    self.fail(e);
                    return Vec::new();
                }
            }
        }
        intents
    }

    /// Validate one signal against the position state as it will be once
    /// the earlier intents of the same batch settle.
    fn authorize(
        &self,
        signal: Signal,
        event: &MarketEvent,
        projected: &mut BTreeMap<String, Option<(Direction, f64)>>,
    ) -> Result<Option<OrderIntent>, TickloomError> {
        let at = event.timestamp();
        let instrument = signal.instrument().to_string();
        let Some(psm) = self.ctx.position_machine(&instrument) else {
            return Err(TickloomError::strategy(
                &instrument,
                at,
                format!("strategy '{}' signalled an instrument it did not subscribe to", self.name()),
            ));
        };
        let price = if event.instrument() == instrument {
            event.mark_price()
        } else {
            self.ctx.last_price(&instrument).ok_or_else(|| {
                TickloomError::invariant(&instrument, at, "no price seen for instrument yet")
            })?
        };
        let current = projected
            .entry(instrument.clone())
            .or_insert_with(|| psm.position().map(|p| (p.direction, p.size)));

        match signal {
            Signal::Enter {
                direction,
                stop_price,
                ..
            } => {
                if let Some((open, _)) = current {
                    return Err(TickloomError::invariant(
                        &instrument,
                        at,
                        format!("entry {direction} while {open} position is open"),
                    ));
                }
                let stop_price = psm.validate_entry(direction, price, stop_price, at)?;
                let size = self.ctx.params().size;
                *current = Some((direction, size));
                Ok(Some(OrderIntent {
                    request: OrderRequest {
                        instrument,
                        direction,
                        size,
                        purpose: OrderPurpose::Entry,
                        timestamp: at,
                    },
                    action: IntentAction::Open {
                        direction,
                        entry_price: price,
                        stop_price,
                    },
                }))
            }
            Signal::Exit { .. } => {
                let Some((direction, size)) = current.take() else {
                    debug!(strategy = self.name(), %instrument, "exit while flat ignored");
                    return Ok(None);
                };
                Ok(Some(OrderIntent {
                    request: OrderRequest {
                        instrument,
                        direction: opposite(direction),
                        size,
                        purpose: OrderPurpose::Exit(ExitReason::Signal),
                        timestamp: at,
                    },
                    action: IntentAction::Close {
                        reason: ExitReason::Signal,
                        fill_price: price,
                    },
                }))
            }
        }
    }

    /// Whether `intent` should go to the gateway. Once an order on an
    /// instrument fails, the remaining intents on it for the same event are
    /// withheld and recorded as execution failures.
    pub fn admit(&mut self, intent: &OrderIntent) -> bool {
        if !self.is_running() {
            return false;
        }
        let request = &intent.request;
        if !self.refused.contains(&request.instrument) {
            return true;
        }
        warn!(
            strategy = self.name(),
            instrument = %request.instrument,
            purpose = %request.purpose,
            "order withheld after an earlier order failed"
        );
        self.execution_failures.push(ExecutionFailure {
            instrument: request.instrument.clone(),
            timestamp: request.timestamp,
            purpose: request.purpose,
            reason: "withheld: an earlier order on this instrument failed".to_string(),
        });
        false
    }

    /// Phase 3: apply the gateway's answer. An unconfirmed order never
    /// changes position state.
    pub fn settle(&mut self, intent: OrderIntent, outcome: Result<DealReference, TickloomError>) {
        let request = intent.request;
        let deal = match outcome {
            Ok(deal) => deal,
            Err(e) => {
                warn!(
                    strategy = self.name(),
                    instrument = %request.instrument,
                    purpose = %request.purpose,
                    error = %e,
                    "order not executed"
                );
                self.refused.insert(request.instrument.clone());
                self.execution_failures.push(ExecutionFailure {
                    instrument: request.instrument,
                    timestamp: request.timestamp,
                    purpose: request.purpose,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let bar = self.ctx.bar_index(&request.instrument);
        let size = request.size;
        let Some(psm) = self.ctx.position_machine_mut(&request.instrument) else {
            return;
        };
        match intent.action {
            IntentAction::Open {
                direction,
                entry_price,
                stop_price,
            } => {
                if let Err(e) = psm.open(
                    direction,
                    entry_price,
                    Some(stop_price),
                    size,
                    request.timestamp,
                    bar,
                ) {
                    self.fail(e);
                    return;
                }
                info!(
                    strategy = self.ctx.name(),
                    instrument = %request.instrument,
                    %direction,
                    entry_price,
                    stop_price,
                    %deal,
                    "position opened"
                );
            }
            IntentAction::Close { reason, fill_price } => {
                match psm.close(fill_price, request.timestamp, bar, reason) {
                    Ok(Some(trade)) => {
                        info!(
                            strategy = self.ctx.name(),
                            instrument = %trade.instrument,
                            direction = %trade.direction,
                            exit_price = trade.exit_price,
                            pnl = trade.pnl,
                            %reason,
                            %deal,
                            "position closed"
                        );
                        if let Err(e) = self.ledger.record(trade) {
                            self.fail(e);
                        }
                    }
                    Ok(None) => {
                        debug!(strategy = self.ctx.name(), instrument = %request.instrument, "close while flat ignored");
                    }
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    /// Move to `Failed`. Only the first failure is kept.
    pub fn fail(&mut self, err: TickloomError) {
        if !self.is_running() {
            return;
        }
        error!(strategy = self.name(), error = %err, "strategy failed");
        self.status = SlotStatus::Failed(Failure::from(&err));
    }

    /// `Running -> Stopped` at shutdown; failures are kept.
    pub fn stop(&mut self) {
        if self.is_running() {
            self.status = SlotStatus::Stopped;
        }
    }

    pub fn into_report(self, starting_equity: f64) -> StrategyReport {
        let open_positions = self
            .ctx
            .open_positions()
            .into_iter()
            .map(|p| {
                let mark_price = self.ctx.last_price(&p.instrument).unwrap_or(p.entry_price);
                OpenPosition {
                    position: p.clone(),
                    mark_price,
                    unrealized_pnl: p.unrealized_pnl(mark_price),
                }
            })
            .collect();
        StrategyReport {
            name: self.ctx.name().to_string(),
            status: self.status,
            warmup: self.warmup,
            metrics: self.ledger.metrics(starting_equity),
            equity_curve: self.ledger.equity_curve(starting_equity),
            trades: self.ledger.trades().to_vec(),
            open_positions,
            execution_failures: self.execution_failures,
            events_processed: self.events,
        }
    }
}

fn opposite(direction: Direction) -> Direction {
    match direction {
        Direction::Long => Direction::Short,
        Direction::Short => Direction::Long,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
