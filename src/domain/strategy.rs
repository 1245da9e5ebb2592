//! Strategy contract.
//!
//! A strategy declares its subscriptions, registers indicators against its
//! chart subscriptions and reacts to events with [`Signal`]s. It never
//! touches position state directly: signals are validated and applied by the
//! runner slot that owns its [`StrategyContext`].

use crate::domain::context::StrategyContext;
use crate::domain::error::TickloomError;
use crate::domain::market::{CandleClose, Tick};
use crate::domain::position::Direction;
use crate::domain::subscription::Subscription;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Enter {
        instrument: String,
        direction: Direction,
        /// `None` when the strategy could not compute a stop; such an entry
        /// is refused.
        stop_price: Option<f64>,
    },
    Exit {
        instrument: String,
    },
}

impl Signal {
    pub fn enter(instrument: impl Into<String>, direction: Direction, stop_price: Option<f64>) -> Self {
        Signal::Enter {
            instrument: instrument.into(),
            direction,
            stop_price,
        }
    }

    pub fn exit(instrument: impl Into<String>) -> Self {
        Signal::Exit {
            instrument: instrument.into(),
        }
    }

    pub fn instrument(&self) -> &str {
        match self {
            Signal::Enter { instrument, .. } | Signal::Exit { instrument } => instrument,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    /// Units per position.
    pub size: f64,
    /// Time stop in bars of the instrument's chart; `None` disables it.
    pub max_hold_bars: Option<u64>,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            size: 1.0,
            max_hold_bars: None,
        }
    }
}

pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn subscriptions(&self) -> Vec<Subscription>;

    fn params(&self) -> StrategyParams {
        StrategyParams::default()
    }

    /// Register indicators. Called once, before warmup.
    fn register(&mut self, _ctx: &mut StrategyContext) -> Result<(), TickloomError> {
        Ok(())
    }

    /// Extra candles fetched on top of the longest indicator warmup.
    fn warmup_margin(&self) -> usize {
        0
    }

    fn on_tick(
        &mut self,
        _tick: &Tick,
        _ctx: &StrategyContext,
    ) -> Result<Vec<Signal>, TickloomError> {
        Ok(Vec::new())
    }

    fn on_candle_close(
        &mut self,
        _event: &CandleClose,
        _ctx: &StrategyContext,
    ) -> Result<Vec<Signal>, TickloomError> {
        Ok(Vec::new())
    }
}
