//! Simple Moving Average of closes.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    closes: VecDeque<f64>,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("SMA", period)?;
        Ok(Self {
            period,
            closes: VecDeque::with_capacity(period),
        })
    }
}

impl Indicator for Sma {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.closes.len() == self.period {
            self.closes.pop_front();
        }
        self.closes.push_back(candle.close);

        if !self.ready() {
            return None;
        }
        let sum: f64 = self.closes.iter().sum();
        Some(IndicatorValue::Simple(sum / self.period as f64))
    }

    fn ready(&self) -> bool {
        self.closes.len() >= self.period
    }

    fn reset(&mut self) {
        self.closes.clear();
    }

    fn warmup_periods(&self) -> usize {
        self.period
    }

    fn label(&self) -> String {
        format!("SMA({})", self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{bars, simple};

    #[test]
    fn warmup_gating_example() {
        let mut sma = Sma::new(3).unwrap();
        let mut values = Vec::new();
        let mut ready = Vec::new();
        for bar in bars(&[1.0, 2.0, 3.0, 4.0]) {
            values.push(simple(sma.update(&bar)));
            ready.push(sma.ready());
        }
        assert_eq!(values, vec![None, None, Some(2.0), Some(3.0)]);
        assert_eq!(ready, vec![false, false, true, true]);
    }

    #[test]
    fn reset_restarts_warmup() {
        let mut sma = Sma::new(2).unwrap();
        for bar in bars(&[1.0, 2.0]) {
            sma.update(&bar);
        }
        assert!(sma.ready());
        sma.reset();
        assert!(!sma.ready());
        assert_eq!(simple(sma.update(&bars(&[10.0])[0])), None);
    }

    #[test]
    fn period_one_tracks_close() {
        let mut sma = Sma::new(1).unwrap();
        for bar in bars(&[5.0, 7.0]) {
            assert_eq!(simple(sma.update(&bar)), Some(bar.close));
        }
    }

    #[test]
    fn label_and_warmup() {
        let sma = Sma::new(20).unwrap();
        assert_eq!(sma.label(), "SMA(20)");
        assert_eq!(sma.warmup_periods(), 20);
        assert!(Sma::new(0).is_err());
    }
}
