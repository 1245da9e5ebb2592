//! Average Directional Index with Wilder's smoothing.
//!
//! The first candle only seeds the previous bar. The next n candles seed
//! the smoothed true range and directional movement as plain sums; after
//! that each is smoothed as `prev - prev / n + current`. ADX is the mean of
//! the first n DX values, then `(prev * (n-1) + DX) / n`. Warmup is `2n`.

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone, Copy)]
struct Bar {
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    prev: Option<Bar>,
    deltas: usize,
    tr: f64,
    plus_dm: f64,
    minus_dm: f64,
    dx_count: usize,
    dx_sum: f64,
    adx: Option<f64>,
}

impl Adx {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("ADX", period)?;
        Ok(Self {
            period,
            prev: None,
            deltas: 0,
            tr: 0.0,
            plus_dm: 0.0,
            minus_dm: 0.0,
            dx_count: 0,
            dx_sum: 0.0,
            adx: None,
        })
    }

    fn directional_index(&self) -> (f64, f64) {
        if self.tr == 0.0 {
            return (0.0, 0.0);
        }
        (
            100.0 * self.plus_dm / self.tr,
            100.0 * self.minus_dm / self.tr,
        )
    }
}

impl Indicator for Adx {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let bar = Bar {
            high: candle.high,
            low: candle.low,
            close: candle.close,
        };
        let prev = self.prev.replace(bar)?;

        let tr = candle.true_range(prev.close);
        let up = bar.high - prev.high;
        let down = prev.low - bar.low;
        let plus = if up > down && up > 0.0 { up } else { 0.0 };
        let minus = if down > up && down > 0.0 { down } else { 0.0 };

        let n = self.period as f64;
        self.deltas += 1;
        if self.deltas <= self.period {
            self.tr += tr;
            self.plus_dm += plus;
            self.minus_dm += minus;
            if self.deltas < self.period {
                return None;
            }
        } else {
            self.tr = self.tr - self.tr / n + tr;
            self.plus_dm = self.plus_dm - self.plus_dm / n + plus;
            self.minus_dm = self.minus_dm - self.minus_dm / n + minus;
        }

        let (plus_di, minus_di) = self.directional_index();
        let sum = plus_di + minus_di;
        let dx = if sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / sum
        };

        let adx = match self.adx {
            Some(prev) => (prev * (n - 1.0) + dx) / n,
            None => {
                self.dx_count += 1;
                self.dx_sum += dx;
                if self.dx_count < self.period {
                    return None;
                }
                self.dx_sum / n
            }
        };
        self.adx = Some(adx);
        Some(IndicatorValue::Adx {
            adx,
            plus_di,
            minus_di,
        })
    }

    fn ready(&self) -> bool {
        self.adx.is_some()
    }

    fn reset(&mut self) {
        self.prev = None;
        self.deltas = 0;
        self.tr = 0.0;
        self.plus_dm = 0.0;
        self.minus_dm = 0.0;
        self.dx_count = 0;
        self.dx_sum = 0.0;
        self.adx = None;
    }

    fn warmup_periods(&self) -> usize {
        2 * self.period
    }

    fn label(&self) -> String {
        format!("ADX({})", self.period)
    }
}
