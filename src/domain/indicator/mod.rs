//! Streaming technical indicators.
//!
//! Every indicator implements [`Indicator`]: it is fed one completed candle at
//! a time and produces `None` until it has seen `warmup_periods()` candles
//! since construction or the last `reset()`. The warmup length is fixed at
//! construction.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod host;
pub mod macd;
pub mod mfi;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod vwap;
pub mod williams_r;
pub mod wma;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::Bollinger;
pub use cci::Cci;
pub use ema::Ema;
pub use host::{IndicatorHandle, IndicatorHost};
pub use macd::Macd;
pub use mfi::Mfi;
pub use obv::Obv;
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::Stochastic;
pub use vwap::Vwap;
pub use williams_r::WilliamsR;
pub use wma::Wma;

use crate::domain::error::TickloomError;
use crate::domain::market::Candle;

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Adx {
        adx: f64,
        plus_di: f64,
        minus_di: f64,
    },
}

impl IndicatorValue {
    /// The scalar value for single-output indicators.
    pub fn as_simple(&self) -> Option<f64> {
        match self {
            IndicatorValue::Simple(v) => Some(*v),
            _ => None,
        }
    }
}

/// Capability contract shared by every indicator variant.
pub trait Indicator: Send {
    /// Feed one completed candle; `None` until ready.
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue>;

    fn ready(&self) -> bool;

    /// Return to the freshly constructed state.
    fn reset(&mut self);

    /// Number of candles needed before the first value.
    fn warmup_periods(&self) -> usize;

    /// Display label, e.g. `SMA(20)`.
    fn label(&self) -> String;
}

pub(crate) fn require_period(name: &str, period: usize) -> Result<usize, TickloomError> {
    if period == 0 {
        return Err(TickloomError::configuration(format!(
            "{name} period must be > 0"
        )));
    }
    Ok(period)
}
