//! Built-in strategies, constructed from `[strategy.<id>]` sections.

pub mod ma_cross;
pub mod momentum;

pub use ma_cross::MovingAverageCross;
pub use momentum::Momentum;

use crate::domain::config_validation::{KindParams, StrategySpec};
use crate::domain::strategy::{Strategy, StrategyParams};

pub fn build(spec: &StrategySpec) -> Box<dyn Strategy> {
    let params = StrategyParams {
        size: spec.size,
        max_hold_bars: spec.max_hold_bars,
    };
    match spec.params {
        KindParams::MaCross {
            fast,
            slow,
            atr_period,
            atr_multiple,
        } => Box::new(
            MovingAverageCross::new(&spec.id, &spec.instrument, spec.timeframe, fast, slow)
                .with_atr_stop(atr_period, atr_multiple)
                .with_params(params)
                .with_warmup_margin(spec.warmup_margin),
        ),
        KindParams::Momentum {
            lookback,
            threshold_pct,
            stop_pct,
        } => Box::new(
            Momentum::new(&spec.id, &spec.instrument, spec.timeframe, lookback)
                .with_threshold_pct(threshold_pct)
                .with_stop_pct(stop_pct)
                .with_params(params)
                .with_warmup_margin(spec.warmup_margin),
        ),
    }
}
