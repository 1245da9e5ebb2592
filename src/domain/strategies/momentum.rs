//! Close-to-close momentum over a lookback, with a percentage stop.
//!
//! Long when the rate of change is above `threshold_pct`, short when below
//! its negative. An open position is closed once momentum turns against it.

use crate::domain::context::StrategyContext;
use crate::domain::error::TickloomError;
use crate::domain::indicator::{IndicatorHandle, Roc};
use crate::domain::market::{CandleClose, Timeframe};
use crate::domain::position::Direction;
use crate::domain::strategy::{Signal, Strategy, StrategyParams};
use crate::domain::subscription::Subscription;

#[derive(Debug)]
pub struct Momentum {
    name: String,
    instrument: String,
    timeframe: Timeframe,
    lookback: usize,
    threshold_pct: f64,
    stop_pct: f64,
    params: StrategyParams,
    warmup_margin: usize,
    roc: Option<IndicatorHandle>,
}

impl Momentum {
    pub fn new(name: &str, instrument: &str, timeframe: Timeframe, lookback: usize) -> Self {
        Self {
            name: name.to_string(),
            instrument: instrument.to_string(),
            timeframe,
            lookback,
            threshold_pct: 0.1,
            stop_pct: 1.0,
            params: StrategyParams::default(),
            warmup_margin: 0,
            roc: None,
        }
    }

    pub fn with_threshold_pct(mut self, pct: f64) -> Self {
        self.threshold_pct = pct;
        self
    }

    pub fn with_stop_pct(mut self, pct: f64) -> Self {
        self.stop_pct = pct;
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
}

impl Strategy for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::chart(self.instrument.clone(), self.timeframe)]
    }

    fn params(&self) -> StrategyParams {
        self.params
    }

    fn register(&mut self, ctx: &mut StrategyContext) -> Result<(), TickloomError> {
        let sub = Subscription::chart(self.instrument.clone(), self.timeframe);
        self.roc = Some(ctx.register_indicator(&sub, Box::new(Roc::new(self.lookback)?))?);
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
        let Some(roc) = self.roc.and_then(|h| ctx.indicator_value(h)) else {
            return Ok(Vec::new());
        };

        let wanted = if roc > self.threshold_pct {
            Some(Direction::Long)
        } else if roc < -self.threshold_pct {
            Some(Direction::Short)
        } else {
            None
        };

        let mut signals = Vec::new();
        if let Some(position) = ctx.position(&event.instrument) {
            let against = position.direction.sign() * roc < 0.0;
            if !against {
                return Ok(signals);
            }
            signals.push(Signal::exit(&event.instrument));
        }

        if let Some(direction) = wanted {
            let close = event.candle.close;
            let stop = close * (1.0 - direction.sign() * self.stop_pct / 100.0);
            signals.push(Signal::enter(&event.instrument, direction, Some(stop)));
        }
        Ok(signals)
    }
}
