//! MACD (Moving Average Convergence Divergence).
//!
//! line = EMA(fast) - EMA(slow), signal = EMA(signal) of the line,
//! histogram = line - signal. The line exists after `slow` candles and the
//! signal needs `signal` line values, so the warmup is `slow + signal - 1`.

use crate::domain::error::TickloomError;
use crate::domain::indicator::ema::Ema;
use crate::domain::indicator::{require_period, Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    fast: Ema,
    slow: Ema,
    signal: Ema,
    count: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self, TickloomError> {
        let fast_period = require_period("MACD fast", fast)?;
        let slow_period = require_period("MACD slow", slow)?;
        let signal_period = require_period("MACD signal", signal)?;
        if fast_period >= slow_period {
            return Err(TickloomError::configuration(format!(
                "MACD fast period ({fast_period}) must be less than slow period ({slow_period})"
            )));
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
            fast: Ema::new(fast_period)?,
            slow: Ema::new(slow_period)?,
            signal: Ema::new(signal_period)?,
            count: 0,
        })
    }
}

impl Indicator for Macd {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        self.count += 1;
        let fast = self.fast.update_value(candle.close);
        let slow = self.slow.update_value(candle.close)?;
        let line = fast? - slow;
        let signal = self.signal.update_value(line)?;
        Some(IndicatorValue::Macd {
            line,
            signal,
            histogram: line - signal,
        })
    }

    fn ready(&self) -> bool {
        self.count >= self.warmup_periods()
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.signal.reset();
        self.count = 0;
    }

    fn warmup_periods(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    fn label(&self) -> String {
        format!(
            "MACD({}, {}, {})",
            self.fast_period, self.slow_period, self.signal_period
        )
    }
}
