#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tickloom::domain::context::StrategyContext;
use tickloom::domain::error::TickloomError;
use tickloom::domain::execution::{DealReference, OrderRequest};
use tickloom::domain::market::{Candle, CandleClose, Tick, Timeframe};
use tickloom::domain::position::Direction;
use tickloom::domain::strategy::{Signal, Strategy, StrategyParams};
use tickloom::domain::subscription::Subscription;
use tickloom::ports::execution_port::ExecutionGateway;

pub fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

/// Close instant of the `n`th hourly bar.
pub fn hour(n: i64) -> DateTime<Utc> {
    base() + Duration::hours(n)
}

/// Hourly candles closing at `hour(first)`, `hour(first + 1)`, ... with a
/// fixed 0.5 range around each close.
pub fn hourly(first: i64, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Candle {
            timestamp: hour(first + i as i64),
            open: c,
            high: c + 0.5,
            low: c - 0.5,
            close: c,
            volume: 100.0,
            tick_count: 10,
        })
        .collect()
}

pub fn tick(instrument: &str, at: DateTime<Utc>, mid: f64) -> Tick {
    Tick {
        instrument: instrument.into(),
        bid: mid - 0.01,
        offer: mid + 0.01,
        timestamp: at,
    }
}

/// A wave that produces several moving-average crosses.
pub fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 5.0 * ((i as f64) / 4.0).sin() + 0.1 * i as f64)
        .collect()
}

pub fn candle_csv(candles: &[Candle]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.timestamp.to_rfc3339(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        ));
    }
    out
}

pub fn write_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// Emits the scripted signals on the n-th candle close it sees (1-based).
pub struct Scripted {
    name: String,
    instrument: String,
    params: StrategyParams,
    script: BTreeMap<u64, Vec<Signal>>,
    seen: u64,
}

impl Scripted {
    pub fn new(name: &str, instrument: &str) -> Self {
        Self {
            name: name.into(),
            instrument: instrument.into(),
            params: StrategyParams::default(),
            script: BTreeMap::new(),
            seen: 0,
        }
    }

    pub fn at(mut self, bar: u64, signal: Signal) -> Self {
        self.script.entry(bar).or_default().push(signal);
        self
    }

    pub fn long(self, bar: u64, stop: f64) -> Self {
        let instrument = self.instrument.clone();
        self.at(bar, Signal::enter(instrument, Direction::Long, Some(stop)))
    }

    pub fn exit(self, bar: u64) -> Self {
        let instrument = self.instrument.clone();
        self.at(bar, Signal::exit(instrument))
    }

    pub fn max_hold(mut self, bars: u64) -> Self {
        self.params.max_hold_bars = Some(bars);
        self
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::chart(self.instrument.clone(), Timeframe::Hour)]
    }

    fn params(&self) -> StrategyParams {
        self.params
    }

    fn on_candle_close(
        &mut self,
        _event: &CandleClose,
        _ctx: &StrategyContext,
    ) -> Result<Vec<Signal>, TickloomError> {
        self.seen += 1;
        Ok(self.script.get(&self.seen).cloned().unwrap_or_default())
    }
}

/// Async gateway that records orders and can refuse an instrument.
#[derive(Default)]
pub struct RecordingGateway {
    pub orders: Mutex<Vec<OrderRequest>>,
    pub reject: Option<String>,
}

#[async_trait]
impl ExecutionGateway for RecordingGateway {
    async fn place_order(&self, request: &OrderRequest) -> Result<DealReference, TickloomError> {
        if self.reject.as_deref() == Some(request.instrument.as_str()) {
            return Err(TickloomError::execution(
                &request.instrument,
                request.timestamp,
                "market closed",
            ));
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(DealReference(format!("D{}", orders.len())))
    }
}
