//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k).

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    count: usize,
    seed_sum: f64,
    ema: f64,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("EMA", period)?;
        Ok(Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            count: 0,
            seed_sum: 0.0,
            ema: 0.0,
        })
    }

    /// Feed a raw value rather than a candle close.
    pub(crate) fn update_value(&mut self, value: f64) -> Option<f64> {
        self.count += 1;
        if self.count < self.period {
            self.seed_sum += value;
            return None;
        }
        if self.count == self.period {
            self.seed_sum += value;
            self.ema = self.seed_sum / self.period as f64;
        } else {
            self.ema = value * self.k + self.ema * (1.0 - self.k);
        }
        Some(self.ema)
    }
}

impl Indicator for Ema {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        self.update_value(candle.close).map(IndicatorValue::Simple)
    }

    fn ready(&self) -> bool {
        self.count >= self.period
    }

    fn reset(&mut self) {
        self.count = 0;
        self.seed_sum = 0.0;
        self.ema = 0.0;
    }

    fn warmup_periods(&self) -> usize {
        self.period
    }

    fn label(&self) -> String {
        format!("EMA({})", self.period)
    }
}
