//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)), and 100 when avg_loss == 0.
//! n changes need n + 1 closes, so the warmup is `period + 1`.

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    count: usize,
    prev_close: Option<f64>,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("RSI", period)?;
        Ok(Self {
            period,
            count: 0,
            prev_close: None,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    fn value(&self) -> f64 {
        if self.avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + self.avg_gain / self.avg_loss))
        }
    }
}

impl Indicator for Rsi {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        self.count += 1;
        let Some(prev) = self.prev_close.replace(candle.close) else {
            return None;
        };

        let change = candle.close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let changes = self.count - 1;
        let n = self.period as f64;

        if changes < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            return None;
        }
        if changes == self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            self.avg_gain = self.gain_sum / n;
            self.avg_loss = self.loss_sum / n;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }
        Some(IndicatorValue::Simple(self.value()))
    }

    fn ready(&self) -> bool {
        self.count > self.period
    }

    fn reset(&mut self) {
        self.count = 0;
        self.prev_close = None;
        self.gain_sum = 0.0;
        self.loss_sum = 0.0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }

    fn warmup_periods(&self) -> usize {
        self.period + 1
    }

    fn label(&self) -> String {
        format!("RSI({})", self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{bars, simple};

    fn run(period: usize, closes: &[f64]) -> Vec<Option<f64>> {
        let mut rsi = Rsi::new(period).unwrap();
        bars(closes).iter().map(|b| simple(rsi.update(b))).collect()
    }

    #[test]
    fn all_gains_is_100() {
        let values = run(3, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(values[2], None);
        assert!((values[3].unwrap() - 100.0).abs() < f64::EPSILON);
        assert!((values[4].unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_losses_is_0() {
        let values = run(3, &[5.0, 4.0, 3.0, 2.0]);
        assert!(values[3].unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn wilder_smoothing() {
        // changes: +2, -1, +1, -2
        let values = run(3, &[10.0, 12.0, 11.0, 12.0, 10.0]);
        let avg_gain = 3.0 / 3.0;
        let avg_loss = 1.0 / 3.0;
        let first = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((values[3].unwrap() - first).abs() < 1e-10);

        let avg_gain = (avg_gain * 2.0 + 0.0) / 3.0;
        let avg_loss = (avg_loss * 2.0 + 2.0) / 3.0;
        let second = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((values[4].unwrap() - second).abs() < 1e-10);
    }

    #[test]
    fn warmup_is_period_plus_one() {
        assert_eq!(Rsi::new(14).unwrap().warmup_periods(), 15);
    }
}
