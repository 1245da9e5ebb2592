//! Stochastic oscillator.
//!
//! %K = (C - LL(k)) / (HH(k) - LL(k)) * 100 (50 for a window with no range),
//! %D = SMA(d) of %K. Warmup is `k + d - 1`.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
    window: VecDeque<(f64, f64)>,
    k_values: VecDeque<f64>,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize) -> Result<Self, TickloomError> {
        let k_period = require_period("Stochastic %K", k_period)?;
        let d_period = require_period("Stochastic %D", d_period)?;
        Ok(Self {
            k_period,
            d_period,
            window: VecDeque::with_capacity(k_period),
            k_values: VecDeque::with_capacity(d_period),
        })
    }
}

impl Indicator for Stochastic {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.window.len() == self.k_period {
            self.window.pop_front();
        }
        self.window.push_back((candle.high, candle.low));
        if self.window.len() < self.k_period {
            return None;
        }

        let highest = self.window.iter().map(|w| w.0).fold(f64::MIN, f64::max);
        let lowest = self.window.iter().map(|w| w.1).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        let k = if range == 0.0 {
            50.0
        } else {
            (candle.close - lowest) / range * 100.0
        };

        if self.k_values.len() == self.d_period {
            self.k_values.pop_front();
        }
        self.k_values.push_back(k);
        if !self.ready() {
            return None;
        }
        let d = self.k_values.iter().sum::<f64>() / self.d_period as f64;
        Some(IndicatorValue::Stochastic { k, d })
    }

    fn ready(&self) -> bool {
        self.k_values.len() >= self.d_period
    }

    fn reset(&mut self) {
        self.window.clear();
        self.k_values.clear();
    }

    fn warmup_periods(&self) -> usize {
        self.k_period + self.d_period - 1
    }

    fn label(&self) -> String {
        format!("STOCH({}, {})", self.k_period, self.d_period)
    }
}
