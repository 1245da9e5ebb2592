//! Bollinger Bands: SMA(n) middle band +/- k population standard deviations.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    closes: VecDeque<f64>,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64) -> Result<Self, TickloomError> {
        let period = require_period("Bollinger", period)?;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(TickloomError::configuration(format!(
                "Bollinger multiplier must be a positive number, got {multiplier}"
            )));
        }
        Ok(Self {
            period,
            multiplier,
            closes: VecDeque::with_capacity(period),
        })
    }
}

impl Indicator for Bollinger {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.closes.len() == self.period {
            self.closes.pop_front();
        }
        self.closes.push_back(candle.close);
        if !self.ready() {
            return None;
        }

        let n = self.period as f64;
        let middle = self.closes.iter().sum::<f64>() / n;
        let variance = self
            .closes
            .iter()
            .map(|c| (c - middle).powi(2))
            .sum::<f64>()
            / n;
        let width = self.multiplier * variance.sqrt();
        Some(IndicatorValue::Bollinger {
            upper: middle + width,
            middle,
            lower: middle - width,
        })
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
        format!("BB({}, {})", self.period, self.multiplier)
    }
}
