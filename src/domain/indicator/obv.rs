//! On-Balance Volume.
//!
//! Running total starting at 0 on the first candle: add volume on an up
//! close, subtract on a down close, unchanged otherwise. The first value is
//! emitted once a close-to-close comparison exists, i.e. on the second candle.

use crate::domain::indicator::{Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone, Default)]
pub struct Obv {
    prev_close: Option<f64>,
    total: f64,
    compared: bool,
}

impl Obv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Obv {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let prev = self.prev_close.replace(candle.close)?;
        if candle.close > prev {
            self.total += candle.volume;
        } else if candle.close < prev {
            self.total -= candle.volume;
        }
        self.compared = true;
        Some(IndicatorValue::Simple(self.total))
    }

    fn ready(&self) -> bool {
        self.compared
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn warmup_periods(&self) -> usize {
        2
    }

    fn label(&self) -> String {
        "OBV".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{bars, simple};

    #[test]
    fn accumulates_signed_volume() {
        let mut obv = Obv::new();
        let mut candles = bars(&[10.0, 11.0, 11.0, 9.0]);
        candles[1].volume = 500.0;
        candles[2].volume = 700.0;
        candles[3].volume = 200.0;
        let values: Vec<_> = candles.iter().map(|c| simple(obv.update(c))).collect();
        assert_eq!(values, vec![None, Some(500.0), Some(500.0), Some(300.0)]);
    }
}
