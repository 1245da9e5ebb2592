//! Williams %R over the last n candles, in [-100, 0].
//!
//! %R = (highest high - close) / (highest high - lowest low) * -100.
//! A window with no range reads -50.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct WilliamsR {
    period: usize,
    window: VecDeque<(f64, f64)>,
}

impl WilliamsR {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("Williams %R", period)?;
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
        })
    }
}

impl Indicator for WilliamsR {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back((candle.high, candle.low));
        if !self.ready() {
            return None;
        }

        let highest = self.window.iter().map(|w| w.0).fold(f64::MIN, f64::max);
        let lowest = self.window.iter().map(|w| w.1).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        let value = if range == 0.0 {
            -50.0
        } else {
            (highest - candle.close) / range * -100.0
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
        format!("%R({})", self.period)
    }
}
