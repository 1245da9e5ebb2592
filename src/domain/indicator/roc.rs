//! Rate of Change: percent change of the close over n candles.
//!
//! ROC = (C[i] - C[i-n]) / C[i-n] * 100, and 0 when C[i-n] == 0.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    closes: VecDeque<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("ROC", period)?;
        Ok(Self {
            period,
            closes: VecDeque::with_capacity(period + 1),
        })
    }
}

impl Indicator for Roc {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.closes.len() == self.period + 1 {
            self.closes.pop_front();
        }
        self.closes.push_back(candle.close);
        if !self.ready() {
            return None;
        }

        let base = *self.closes.front()?;
        let value = if base == 0.0 {
            0.0
        } else {
            (candle.close - base) / base * 100.0
        };
        Some(IndicatorValue::Simple(value))
    }

    fn ready(&self) -> bool {
        self.closes.len() > self.period
    }

    fn reset(&mut self) {
        self.closes.clear();
    }

    fn warmup_periods(&self) -> usize {
        self.period + 1
    }

    fn label(&self) -> String {
        format!("ROC({})", self.period)
    }
}
