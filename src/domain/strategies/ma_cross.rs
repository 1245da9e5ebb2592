//! Fast/slow SMA crossover with an ATR-multiple stop.
//!
//! A cross up closes any short and goes long; a cross down closes any long
//! and goes short. No entry is signalled until the ATR is ready.

use tracing::debug;

use crate::domain::context::StrategyContext;
use crate::domain::error::TickloomError;
use crate::domain::indicator::{Atr, IndicatorHandle, Sma};
use crate::domain::market::{CandleClose, Timeframe};
use crate::domain::position::Direction;
use crate::domain::strategy::{Signal, Strategy, StrategyParams};
use crate::domain::subscription::Subscription;

#[derive(Debug, Clone, Copy)]
struct Handles {
    fast: IndicatorHandle,
    slow: IndicatorHandle,
    atr: IndicatorHandle,
}

#[derive(Debug)]
pub struct MovingAverageCross {
    name: String,
    instrument: String,
    timeframe: Timeframe,
    fast: usize,
    slow: usize,
    atr_period: usize,
    atr_multiple: f64,
    params: StrategyParams,
    warmup_margin: usize,
    handles: Option<Handles>,
    prev_spread: Option<f64>,
}

impl MovingAverageCross {
    pub fn new(name: &str, instrument: &str, timeframe: Timeframe, fast: usize, slow: usize) -> Self {
        Self {
            name: name.to_string(),
            instrument: instrument.to_string(),
            timeframe,
            fast,
            slow,
            atr_period: 14,
            atr_multiple: 2.0,
            params: StrategyParams::default(),
            warmup_margin: 0,
            handles: None,
            prev_spread: None,
        }
    }

    pub fn with_atr_stop(mut self, period: usize, multiple: f64) -> Self {
        self.atr_period = period;
        self.atr_multiple = multiple;
        self
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_warmup_margin(mut self, margin: usize) -> Self {
        self.warmup_margin = margin;
        self
    }

    fn subscription(&self) -> Subscription {
        Subscription::chart(self.instrument.clone(), self.timeframe)
    }
}

impl Strategy for MovingAverageCross {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![self.subscription()]
    }

    fn params(&self) -> StrategyParams {
        self.params
    }

    fn register(&mut self, ctx: &mut StrategyContext) -> Result<(), TickloomError> {
        if self.fast >= self.slow {
            return Err(TickloomError::configuration(format!(
                "strategy '{}': fast period {} must be below slow period {}",
                self.name, self.fast, self.slow
            )));
        }
        let sub = self.subscription();
        self.handles = Some(Handles {
            fast: ctx.register_indicator(&sub, Box::new(Sma::new(self.fast)?))?,
            slow: ctx.register_indicator(&sub, Box::new(Sma::new(self.slow)?))?,
            atr: ctx.register_indicator(&sub, Box::new(Atr::new(self.atr_period)?))?,
        });
        Ok(())
    }

    fn warmup_margin(&self) -> usize {
        self.warmup_margin
    }

    fn on_candle_close(
        &mut self,
        event: &CandleClose,
        ctx: &StrategyContext,
    ) -> Result<Vec<Signal>, TickloomError> {
        let Some(handles) = self.handles else {
            return Ok(Vec::new());
        };
        let (Some(fast), Some(slow)) = (
            ctx.indicator_value(handles.fast),
            ctx.indicator_value(handles.slow),
        ) else {
            return Ok(Vec::new());
        };

        let spread = fast - slow;
        let Some(prev) = self.prev_spread.replace(spread) else {
            return Ok(Vec::new());
        };
        let wanted = if prev <= 0.0 && spread > 0.0 {
            Direction::Long
        } else if prev >= 0.0 && spread < 0.0 {
            Direction::Short
        } else {
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        match ctx.position(&event.instrument) {
            Some(p) if p.direction == wanted => return Ok(signals),
            Some(_) => signals.push(Signal::exit(&event.instrument)),
            None => {}
        }

        let close = event.candle.close;
        match ctx.indicator_value(handles.atr) {
            Some(atr) => {
                let distance = atr * self.atr_multiple;
                let stop = close - wanted.sign() * distance;
                signals.push(Signal::enter(&event.instrument, wanted, Some(stop)));
            }
            None => debug!(strategy = %self.name, "cross without ATR, entry skipped"),
        }
        Ok(signals)
    }
}
