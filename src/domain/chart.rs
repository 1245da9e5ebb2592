//! Rolling window of completed candles for one chart feed.

use std::collections::VecDeque;

use crate::domain::market::{Candle, Timeframe};

pub const DEFAULT_CHART_HISTORY: usize = 200;

#[derive(Debug, Clone)]
pub struct ChartHistory {
    pub instrument: String,
    pub timeframe: Timeframe,
    max_length: usize,
    candles: VecDeque<Candle>,
}

impl ChartHistory {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe, max_length: usize) -> Self {
        let max_length = max_length.max(1);
        Self {
            instrument: instrument.into(),
            timeframe,
            max_length,
            candles: VecDeque::with_capacity(max_length),
        }
    }

    /// Append a candle, evicting the oldest one when full.
    pub fn add_candle(&mut self, candle: Candle) {
        if self.candles.len() == self.max_length {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    /// The most recent `count` candles (all when `None`), oldest first.
    pub fn candles(&self, count: Option<usize>) -> Vec<&Candle> {
        let skip = match count {
            Some(n) => self.candles.len().saturating_sub(n),
            None => 0,
        };
        self.candles.iter().skip(skip).collect()
    }

    pub fn opens(&self, count: Option<usize>) -> Vec<f64> {
        self.candles(count).into_iter().map(|c| c.open).collect()
    }

    pub fn closes(&self, count: Option<usize>) -> Vec<f64> {
        self.candles(count).into_iter().map(|c| c.close).collect()
    }

    pub fn highs(&self, count: Option<usize>) -> Vec<f64> {
        self.candles(count).into_iter().map(|c| c.high).collect()
    }

    pub fn lows(&self, count: Option<usize>) -> Vec<f64> {
        self.candles(count).into_iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self, count: Option<usize>) -> Vec<f64> {
        self.candles(count).into_iter().map(|c| c.volume).collect()
    }

    pub fn tick_counts(&self, count: Option<usize>) -> Vec<u64> {
        self.candles(count).into_iter().map(|c| c.tick_count).collect()
    }

    /// (high + low + close) / 3 per candle.
    pub fn typical_prices(&self, count: Option<usize>) -> Vec<f64> {
        self.candles(count)
            .into_iter()
            .map(Candle::typical_price)
            .collect()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 0.0,
            tick_count: 0,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut chart = ChartHistory::new("GBPUSD", Timeframe::OneMinute, 3);
        for i in 0..5 {
            chart.add_candle(candle(i, i as f64));
        }
        assert_eq!(chart.len(), 3);
        assert_eq!(chart.closes(None), vec![2.0, 3.0, 4.0]);
        assert_eq!(chart.latest().unwrap().close, 4.0);
    }

    #[test]
    fn count_limits_to_most_recent() {
        let mut chart = ChartHistory::new("GBPUSD", Timeframe::OneMinute, 10);
        for i in 0..5 {
            chart.add_candle(candle(i, i as f64));
        }
        assert_eq!(chart.closes(Some(2)), vec![3.0, 4.0]);
        assert_eq!(chart.highs(Some(1)), vec![5.0]);
        assert_eq!(chart.lows(Some(10)).len(), 5);
    }

    #[test]
    fn per_field_series() {
        let mut chart = ChartHistory::new("GBPUSD", Timeframe::OneMinute, 10);
        for i in 0..4 {
            let mut c = candle(i, 10.0 + i as f64);
            c.open = c.close - 0.5;
            c.high = c.close + 3.0;
            c.volume = 100.0 * i as f64;
            c.tick_count = i as u64;
            chart.add_candle(c);
        }
        assert_eq!(chart.opens(Some(2)), vec![11.5, 12.5]);
        assert_eq!(chart.volumes(None), vec![0.0, 100.0, 200.0, 300.0]);
        assert_eq!(chart.tick_counts(Some(3)), vec![1, 2, 3]);
        // (16 + 12 + 13) / 3
        assert_eq!(chart.typical_prices(Some(1)), vec![41.0 / 3.0]);
    }

    #[test]
    fn empty_history() {
        let chart = ChartHistory::new("GBPUSD", Timeframe::OneMinute, 0);
        assert!(chart.is_empty());
        assert!(chart.latest().is_none());
        assert_eq!(chart.max_length(), 1);
    }
}
