//! Session volume-weighted average price.
//!
//! Accumulates price * weight over the session, where price is the typical
//! price (or the close) and weight is the volume, falling back to the tick
//! count and then to 1 so that every candle carries weight. A daily session
//! restarts when the UTC date of the candle changes. Warmup is 1.

use chrono::NaiveDate;

use crate::domain::indicator::{Indicator, IndicatorValue};
use crate::domain::market::Candle;

#[derive(Debug, Clone)]
pub struct Vwap {
    typical_price: bool,
    daily: bool,
    session: Option<NaiveDate>,
    price_volume: f64,
    volume: f64,
}

impl Vwap {
    /// Typical-price VWAP restarting every UTC day.
    pub fn new() -> Self {
        Self {
            typical_price: true,
            daily: true,
            session: None,
            price_volume: 0.0,
            volume: 0.0,
        }
    }

    pub fn close_price(mut self) -> Self {
        self.typical_price = false;
        self
    }

    /// Accumulate across days instead of restarting each UTC day.
    pub fn continuous(mut self) -> Self {
        self.daily = false;
        self
    }
}

impl Default for Vwap {
    fn default() -> Self {
        Self::new()
    }
}

fn weight(candle: &Candle) -> f64 {
    if candle.volume > 0.0 {
        candle.volume
    } else if candle.tick_count > 0 {
        candle.tick_count as f64
    } else {
        1.0
    }
}

impl Indicator for Vwap {
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        if self.daily {
            let day = candle.timestamp.date_naive();
            if self.session.is_some_and(|s| s != day) {
                self.price_volume = 0.0;
                self.volume = 0.0;
            }
            self.session = Some(day);
        }

        let price = if self.typical_price {
            candle.typical_price()
        } else {
            candle.close
        };
        let w = weight(candle);
        self.price_volume += price * w;
        self.volume += w;
        Some(IndicatorValue::Simple(self.price_volume / self.volume))
    }

    fn ready(&self) -> bool {
        self.volume > 0.0
    }

    fn reset(&mut self) {
        self.session = None;
        self.price_volume = 0.0;
        self.volume = 0.0;
    }

    fn warmup_periods(&self) -> usize {
        1
    }

    fn label(&self) -> String {
        "VWAP".to_string()
    }
}
