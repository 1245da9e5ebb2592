//! Cooperative live driver.
//!
//! One task per strategy, all fed from a single broadcast of the shared
//! event source. Tasks suspend only while waiting for the next event or for
//! the gateway's answer to an order. The feed waits while the slowest task
//! has `broadcast_capacity` events queued, so a source that is always ready
//! (a replay) cannot outrun the strategies.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, error, info, warn};

use crate::domain::error::TickloomError;
use crate::domain::execution::{DealReference, OrderRequest};
use crate::domain::market::MarketEvent;
use crate::domain::runner::report::{RunMode, RunReport, StrategyReport};
use crate::domain::runner::slot::{OrderIntent, StrategySlot};
use crate::domain::runner::StrategyRunner;
use crate::ports::event_source::EventSource;
use crate::ports::execution_port::ExecutionGateway;
use crate::ports::history_port::HistoricalDataProvider;

impl StrategyRunner {
    /// Warm every strategy through `history`, then dispatch events from
    /// `source` until it ends or `stop` turns true. The source is closed
    /// before returning.
    pub async fn run_live<S: EventSource>(
        mut self,
        mut source: S,
        history: Arc<dyn HistoricalDataProvider>,
        gateway: Arc<dyn ExecutionGateway>,
        mut stop: watch::Receiver<bool>,
    ) -> RunReport {
        info!(strategies = self.slots.len(), "live run starting");
        for slot in &mut self.slots {
            slot.warm_from_provider(history.as_ref()).await;
        }

        let capacity = self.settings.broadcast_capacity.max(1);
        let order_timeout = self.settings.order_timeout;
        let starting_equity = self.settings.starting_equity;
        let (tx, _) = broadcast::channel::<Arc<MarketEvent>>(capacity);
        let drained = Arc::new(Notify::new());

        let mut tasks = Vec::with_capacity(self.slots.len());
        for slot in self.slots.drain(..) {
            let name = slot.name().to_string();
            let handle = tokio::spawn(run_slot(
                slot,
                tx.subscribe(),
                Arc::clone(&drained),
                Arc::clone(&gateway),
                stop.clone(),
                order_timeout,
            ));
            tasks.push((name, handle));
        }

        let mut dispatched = 0u64;
        let mut source_error = None;
        let mut stop_open = true;
        loop {
            if *stop.borrow() {
                info!("stop requested, no further events dispatched");
                break;
            }
            if tx.receiver_count() == 0 {
                debug!("no strategy left running");
                break;
            }
            // Registered before the queue check so a wakeup in between is kept.
            let room = drained.notified();
            let full = tx.len() >= capacity;
            tokio::select! {
                biased;
                changed = stop.changed(), if stop_open => {
                    if changed.is_err() {
                        stop_open = false;
                    }
                }
                _ = room, if full => {}
                next = source.next_event(), if !full => match next {
                    Ok(Some(event)) => {
                        dispatched += 1;
                        if tx.send(Arc::new(event)).is_err() {
                            debug!("no strategy left running");
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("event source exhausted");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "event source failed");
                        source_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        drop(tx);

        let mut strategies = Vec::with_capacity(tasks.len());
        for (name, handle) in tasks {
            match handle.await {
                Ok(slot) => strategies.push(slot.into_report(starting_equity)),
                Err(e) => {
                    error!(strategy = %name, error = %e, "strategy task aborted");
                    strategies.push(StrategyReport::aborted(
                        name,
                        format!("strategy task aborted: {e}"),
                        starting_equity,
                    ));
                }
            }
        }

        let replay = source.replay_properties().cloned();
        if let Err(e) = source.close().await {
            warn!(error = %e, "event source did not close cleanly");
            source_error.get_or_insert_with(|| e.to_string());
        }
        info!(events = dispatched, "live run finished");

        RunReport {
            mode: RunMode::Live,
            replay,
            strategies,
            events_dispatched: dispatched,
            source_error,
        }
    }
}

async fn run_slot(
    mut slot: StrategySlot,
    mut rx: broadcast::Receiver<Arc<MarketEvent>>,
    drained: Arc<Notify>,
    gateway: Arc<dyn ExecutionGateway>,
    mut stop: watch::Receiver<bool>,
    order_timeout: Duration,
) -> StrategySlot {
    let mut stop_open = true;
    while slot.is_running() && !*stop.borrow() {
        tokio::select! {
            changed = stop.changed(), if stop_open => {
                if changed.is_err() {
                    stop_open = false;
                }
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    drained.notify_waiters();
                    process(&mut slot, &event, gateway.as_ref(), order_timeout).await
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    slot.fail(TickloomError::data(
                        "(shared feed)",
                        None,
                        format!("strategy fell {n} events behind the shared feed"),
                    ));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    // Dropping the receiver releases its queued events.
    drop(rx);
    drained.notify_waiters();
    slot.stop();
    slot
}

async fn process(
    slot: &mut StrategySlot,
    event: &MarketEvent,
    gateway: &dyn ExecutionGateway,
    order_timeout: Duration,
) {
    let forced = slot.begin(event);
    execute(slot, forced, gateway, order_timeout).await;
    let decided = slot.decide(event);
    execute(slot, decided, gateway, order_timeout).await;
}

async fn execute(
    slot: &mut StrategySlot,
    intents: Vec<OrderIntent>,
    gateway: &dyn ExecutionGateway,
    order_timeout: Duration,
) {
    for intent in intents {
        if !slot.admit(&intent) {
            continue;
        }
        let outcome = place(gateway, &intent.request, order_timeout).await;
        slot.settle(intent, outcome);
    }
}

async fn place(
    gateway: &dyn ExecutionGateway,
    request: &OrderRequest,
    order_timeout: Duration,
) -> Result<DealReference, TickloomError> {
    match tokio::time::timeout(order_timeout, gateway.place_order(request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TickloomError::execution(
            &request.instrument,
            request.timestamp,
            format!("order not confirmed within {} ms", order_timeout.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::StrategyContext;
    use crate::domain::error::ErrorKind;
    use crate::domain::indicator::{IndicatorHandle, Sma};
    use crate::domain::market::{Candle, CandleClose, Timeframe};
    use crate::domain::position::Direction;
    use crate::domain::replay::ReplayBuilder;
    use crate::domain::runner::{EngineSettings, SlotStatus};
    use crate::domain::strategy::{Signal, Strategy};
    use crate::domain::subscription::Subscription;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Mutex;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(hour)
    }

    fn candles(closes: &[f64]) -> Vec<Candle> {
        series(1, closes)
    }

    fn series(first_hour: i64, closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                timestamp: at(first_hour + i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 0.0,
                tick_count: 0,
            })
            .collect()
    }

    struct History(Vec<Candle>);

    #[async_trait]
    impl HistoricalDataProvider for History {
        async fn get_candles(
            &self,
            _instrument: &str,
            _timeframe: Timeframe,
            count: usize,
        ) -> Result<Vec<Candle>, TickloomError> {
            let skip = self.0.len().saturating_sub(count);
            Ok(self.0[skip..].to_vec())
        }
    }

    #[derive(Default)]
    struct Gateway {
        placed: Mutex<Vec<OrderRequest>>,
        hang: bool,
    }

    #[async_trait]
    impl ExecutionGateway for Gateway {
        async fn place_order(&self, request: &OrderRequest) -> Result<DealReference, TickloomError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let mut placed = self.placed.lock().unwrap();
            placed.push(request.clone());
            Ok(DealReference(format!("L-{}", placed.len())))
        }
    }

    /// Goes long once its SMA is ready; exits on the following bar.
    struct Flip {
        name: &'static str,
        sma: Option<IndicatorHandle>,
        panic_on_first: bool,
    }

    impl Flip {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                sma: None,
                panic_on_first: false,
            }
        }
    }

    impl Strategy for Flip {
        fn name(&self) -> &str {
            self.name
        }

        fn subscriptions(&self) -> Vec<Subscription> {
            vec![Subscription::chart("EURUSD", Timeframe::Hour)]
        }

        fn register(&mut self, ctx: &mut StrategyContext) -> Result<(), TickloomError> {
            let sub = Subscription::chart("EURUSD", Timeframe::Hour);
            self.sma = Some(ctx.register_indicator(&sub, Box::new(Sma::new(2)?))?);
            Ok(())
        }

        fn on_candle_close(
            &mut self,
            close: &CandleClose,
            ctx: &StrategyContext,
        ) -> Result<Vec<Signal>, TickloomError> {
            if self.panic_on_first {
                panic!("bad strategy");
            }
            let Some(handle) = self.sma else {
                return Ok(Vec::new());
            };
            if ctx.indicator_value(handle).is_none() {
                return Ok(Vec::new());
            }
            if ctx.is_flat(&close.instrument) {
                Ok(vec![Signal::enter(
                    &close.instrument,
                    Direction::Long,
                    Some(close.candle.close * 0.5),
                )])
            } else {
                Ok(vec![Signal::exit(&close.instrument)])
            }
        }
    }

    fn replay(closes: &[f64]) -> crate::domain::replay::ReplaySource {
        let mut builder = ReplayBuilder::new();
        builder
            .add_candles("EURUSD", Timeframe::Hour, candles(closes))
            .unwrap();
        builder.build().source()
    }

    #[tokio::test]
    async fn live_matches_backtest_semantics_on_replay() {
        let mut runner = StrategyRunner::new(EngineSettings::default());
        runner.add(Box::new(Flip::new("flip"))).unwrap();
        let gateway = Arc::new(Gateway::default());
        let (_stop_tx, stop_rx) = watch::channel(false);

        let report = runner
            .run_live(
                replay(&[1.0, 1.1, 1.2, 1.3]),
                Arc::new(History(series(-1, &[0.9, 0.95]))),
                gateway.clone(),
                stop_rx,
            )
            .await;

        let s = report.strategy("flip").unwrap();
        assert_eq!(report.mode, RunMode::Live);
        assert!(report.replay.is_some());
        assert!(s.warmup.all_ready());
        assert_eq!(s.status, SlotStatus::Stopped);
        assert_eq!(s.trades.len(), 2);
        assert_eq!(gateway.placed.lock().unwrap().len(), 4);
        assert_eq!(report.events_dispatched, 4);
    }

    #[tokio::test]
    async fn replay_longer_than_broadcast_capacity_is_not_lost() {
        let settings = EngineSettings {
            broadcast_capacity: 4,
            ..EngineSettings::default()
        };
        let mut runner = StrategyRunner::new(settings);
        runner.add(Box::new(Flip::new("a"))).unwrap();
        runner.add(Box::new(Flip::new("b"))).unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let closes: Vec<f64> = (0..40).map(|i| 1.0 + i as f64 * 0.01).collect();

        let report = runner
            .run_live(
                replay(&closes),
                Arc::new(History(Vec::new())),
                Arc::new(Gateway::default()),
                stop_rx,
            )
            .await;

        assert_eq!(report.events_dispatched, 40);
        for name in ["a", "b"] {
            let s = report.strategy(name).unwrap();
            assert_eq!(s.status, SlotStatus::Stopped);
            assert_eq!(s.events_processed, 40);
            assert_eq!(s.trades.len(), 19);
            assert_eq!(s.open_positions.len(), 1);
        }
    }

    #[tokio::test]
    async fn panicking_strategy_does_not_stop_sibling() {
        let mut runner = StrategyRunner::new(EngineSettings::default());
        let mut bad = Flip::new("bad");
        bad.panic_on_first = true;
        runner.add(Box::new(bad)).unwrap();
        runner.add(Box::new(Flip::new("good"))).unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let report = runner
            .run_live(
                replay(&[1.0, 1.1, 1.2]),
                Arc::new(History(Vec::new())),
                Arc::new(Gateway::default()),
                stop_rx,
            )
            .await;

        match &report.strategy("bad").unwrap().status {
            SlotStatus::Failed(f) => assert_eq!(f.kind, ErrorKind::Strategy),
            other => panic!("expected failure, got {other:?}"),
        }
        let good = report.strategy("good").unwrap();
        assert_eq!(good.status, SlotStatus::Stopped);
        assert_eq!(good.events_processed, 3);
        assert_eq!(good.trades.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn order_timeout_is_execution_failure() {
        let settings = EngineSettings {
            order_timeout: Duration::from_millis(50),
            ..EngineSettings::default()
        };
        let mut runner = StrategyRunner::new(settings);
        runner.add(Box::new(Flip::new("slow"))).unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let gateway = Arc::new(Gateway {
            hang: true,
            ..Gateway::default()
        });

        let report = runner
            .run_live(
                replay(&[1.0, 1.1, 1.2]),
                Arc::new(History(Vec::new())),
                gateway,
                stop_rx,
            )
            .await;

        let s = report.strategy("slow").unwrap();
        assert_eq!(s.status, SlotStatus::Stopped);
        assert!(s.trades.is_empty());
        assert!(s.open_positions.is_empty());
        assert!(!s.execution_failures.is_empty());
        assert!(s.execution_failures[0].reason.contains("not confirmed within 50 ms"));
    }

    #[tokio::test]
    async fn stop_before_start_dispatches_nothing() {
        let mut runner = StrategyRunner::new(EngineSettings::default());
        runner.add(Box::new(Flip::new("idle"))).unwrap();
        let (_stop_tx, stop_rx) = watch::channel(true);

        let report = runner
            .run_live(
                replay(&[1.0, 1.1]),
                Arc::new(History(Vec::new())),
                Arc::new(Gateway::default()),
                stop_rx,
            )
            .await;

        assert_eq!(report.events_dispatched, 0);
        assert_eq!(report.strategy("idle").unwrap().events_processed, 0);
    }
}
