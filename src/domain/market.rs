//! Market event primitives: ticks, candles and candle-close events.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::TickloomError;

/// Candle period of a chart feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    OneMinute,
    FiveMinute,
    FifteenMinute,
    ThirtyMinute,
    Hour,
    FourHour,
    Day,
    Week,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinute,
        Timeframe::FifteenMinute,
        Timeframe::ThirtyMinute,
        Timeframe::Hour,
        Timeframe::FourHour,
        Timeframe::Day,
        Timeframe::Week,
    ];

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::OneMinute => Duration::minutes(1),
            Timeframe::FiveMinute => Duration::minutes(5),
            Timeframe::FifteenMinute => Duration::minutes(15),
            Timeframe::ThirtyMinute => Duration::minutes(30),
            Timeframe::Hour => Duration::hours(1),
            Timeframe::FourHour => Duration::hours(4),
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::weeks(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1MINUTE",
            Timeframe::FiveMinute => "5MINUTE",
            Timeframe::FifteenMinute => "15MINUTE",
            Timeframe::ThirtyMinute => "30MINUTE",
            Timeframe::Hour => "HOUR",
            Timeframe::FourHour => "4HOUR",
            Timeframe::Day => "DAY",
            Timeframe::Week => "WEEK",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TickloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == wanted)
            .ok_or_else(|| TickloomError::configuration(format!("unknown timeframe '{s}'")))
    }
}

/// A completed OHLCV bar. `timestamp` is the instant the bar is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub tick_count: u64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (high + low) / 2
    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// A tick-level price update.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub instrument: String,
    pub bid: f64,
    pub offer: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.offer) / 2.0
    }
}

/// A completed candle on one chart feed.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleClose {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub candle: Candle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Tick(Tick),
    CandleClose(CandleClose),
}

impl MarketEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::Tick(t) => t.timestamp,
            MarketEvent::CandleClose(c) => c.candle.timestamp,
        }
    }

    pub fn instrument(&self) -> &str {
        match self {
            MarketEvent::Tick(t) => &t.instrument,
            MarketEvent::CandleClose(c) => &c.instrument,
        }
    }

    /// Price used to mark positions on this instrument.
    pub fn mark_price(&self) -> f64 {
        match self {
            MarketEvent::Tick(t) => t.mid(),
            MarketEvent::CandleClose(c) => c.candle.close,
        }
    }
}
