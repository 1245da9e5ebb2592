//! Average True Range with Wilder's smoothing.
//!
//! The first candle's true range is its high - low. The first ATR is the mean
//! of the first n true ranges; after that ATR = (prev * (n-1) + TR) / n.

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    count: usize,
    prev_close: Option<f64>,
    tr_sum: f64,
    atr: f64,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("ATR", period)?;
        Ok(Self {
            period,
            count: 0,
            prev_close: None,
            tr_sum: 0.0,
            atr: 0.0,
        })
    }
}

impl Indicator for Atr {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let tr = match self.prev_close {
            Some(prev) => candle.true_range(prev),
            None => candle.range(),
        };
        self.prev_close = Some(candle.close);
        self.count += 1;

        let n = self.period as f64;
        if self.count < self.period {
            self.tr_sum += tr;
            return None;
        }
        if self.count == self.period {
            self.tr_sum += tr;
            self.atr = self.tr_sum / n;
        } else {
            self.atr = (self.atr * (n - 1.0) + tr) / n;
        }
        Some(IndicatorValue::Simple(self.atr))
    }

    fn ready(&self) -> bool {
        self.count >= self.period
    }

    fn reset(&mut self) {
        self.count = 0;
        self.prev_close = None;
        self.tr_sum = 0.0;
        self.atr = 0.0;
    }

    fn warmup_periods(&self) -> usize {
        self.period
    }

    fn label(&self) -> String {
        format!("ATR({})", self.period)
    }
}
