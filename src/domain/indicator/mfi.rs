//! Money Flow Index over the last n typical-price changes, in [0, 100].
//!
//! Volume falls back to the candle's tick count when it is zero. A window
//! with no negative flow reads 100, or 50 when there is no flow at all.
//! Warmup is `period + 1`.

use std::collections::VecDeque;

use crate::domain::error::TickloomError;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Mfi {
    period: usize,
    prev_tp: Option<f64>,
    /// (positive, negative) raw money flow per candle.
    flows: VecDeque<(f64, f64)>,
}

impl Mfi {
    pub fn new(period: usize) -> Result<Self, TickloomError> {
        let period = require_period("MFI", period)?;
        Ok(Self {
            period,
            prev_tp: None,
            flows: VecDeque::with_capacity(period),
        })
    }
}

impl Indicator for Mfi {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let tp = candle.typical_price();
        let prev = self.prev_tp.replace(tp)?;

        let volume = if candle.volume > 0.0 {
            candle.volume
        } else {
            candle.tick_count as f64
        };
        let raw = tp * volume;
        let flow = if tp > prev {
            (raw, 0.0)
        } else if tp < prev {
            (0.0, raw)
        } else {
            (0.0, 0.0)
        };
        if self.flows.len() == self.period {
            self.flows.pop_front();
        }
        self.flows.push_back(flow);
        if !self.ready() {
            return None;
        }

        let positive: f64 = self.flows.iter().map(|f| f.0).sum();
        let negative: f64 = self.flows.iter().map(|f| f.1).sum();
        let value = match (positive == 0.0, negative == 0.0) {
            (true, true) => 50.0,
            (false, true) => 100.0,
            _ => 100.0 - 100.0 / (1.0 + positive / negative),
        };
        Some(IndicatorValue::Simple(value))
    }

    fn ready(&self) -> bool {
        self.flows.len() >= self.period
    }

    fn reset(&mut self) {
        self.prev_tp = None;
        self.flows.clear();
    }

    fn warmup_periods(&self) -> usize {
        self.period + 1
    }

    fn label(&self) -> String {
        format!("MFI({})", self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::{bars, simple};
    use approx::assert_relative_eq;

    #[test]
    fn only_rising_reads_100() {
        let mut mfi = Mfi::new(2).unwrap();
        let values: Vec<_> = bars(&[1.0, 2.0, 3.0])
            .iter()
            .map(|c| simple(mfi.update(c)))
            .collect();
        assert_eq!(values[..2], [None, None]);
        assert_eq!(values[2], Some(100.0));
    }

    #[test]
    fn mixed_flow() {
        let mut mfi = Mfi::new(2).unwrap();
        // +flow 2 * 1000, -flow 1 * 1000: 100 - 100 / 3
        let last = bars(&[1.0, 2.0, 1.0])
            .iter()
            .map(|c| simple(mfi.update(c)))
            .last()
            .flatten();
        assert_relative_eq!(last.unwrap(), 200.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn no_flow_is_neutral() {
        let mut mfi = Mfi::new(3).unwrap();
        let candles: Vec<Candle> = bars(&[2.0, 3.0, 1.0, 5.0])
            .into_iter()
            .map(|mut c| {
                c.volume = 0.0;
                c
            })
            .collect();
        let last = candles.iter().map(|c| simple(mfi.update(c))).last().flatten();
        assert_eq!(last, Some(50.0));
    }
}
