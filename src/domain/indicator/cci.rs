//! Commodity Channel Index over typical price.
//!
//! CCI = (TP - mean(TP)) / (0.015 * mean deviation). A window with no mean
//! deviation reads 0.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

const LAMBERT: f64 = 0.015;

#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
    window: VecDeque<f64>,
}

impl Cci {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("CCI", period)?;
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
        })
    }
}

impl Indicator for Cci {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        let tp = candle.typical_price();
        self.window.push_back(tp);
        if !self.ready() {
            return None;
        }

        let n = self.period as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let deviation = self.window.iter().map(|x| (x - mean).abs()).sum::<f64>() / n;
        let value = if deviation == 0.0 {
            0.0
        } else {
            (tp - mean) / (LAMBERT * deviation)
        };
        Some(IndicatorValue::Simple(value))
    }

    fn ready(&self) -> bool {
        self.window.len() >= self.period
    }

    fn reset(&mut self) {
        self.window.clear();
    }

    fn warmup_periods(&self) -> usize {
        self.period
    }

    fn label(&self) -> String {
        format!("CCI({})", self.period)
    }
}
