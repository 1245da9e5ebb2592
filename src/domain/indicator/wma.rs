//! Weighted Moving Average: linearly weighted, newest close weighs `n`.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Wma {
    period: usize,
    closes: VecDeque<f64>,
}

impl Wma {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("WMA", period)?;
        Ok(Self {
            period,
            closes: VecDeque::with_capacity(period),
        })
    }
}

impl Indicator for Wma {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.closes.len() == self.period {
            self.closes.pop_front();
        }
        self.closes.push_back(candle.close);
        if !self.ready() {
            return None;
        }

        let denominator = (self.period * (self.period + 1)) as f64 / 2.0;
        let weighted: f64 = self
            .closes
            .iter()
            .enumerate()
            .map(|(i, c)| c * (i + 1) as f64)
            .sum();
        Some(IndicatorValue::Simple(weighted / denominator))
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
        format!("WMA({})", self.period)
    }
}
