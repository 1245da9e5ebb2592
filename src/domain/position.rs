//! Per-instrument position state machine.
//!
//! `Flat -> Long|Short` through [`PositionStateMachine::open`], which is the
//! single place a position can come into existence and refuses any entry
//! without a usable stop. `Long|Short -> Flat` through
//! [`PositionStateMachine::close`], which is idempotent.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::error::TickloomError;
use crate::domain::ledger::{ExitReason, Trade};
use crate::domain::market::{Candle, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_bar_index: u64,
    pub stop_price: f64,
    pub size: f64,
}

impl Position {
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price) * self.size
    }

    /// Whether `price` is at or through the stop.
    pub fn stop_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_price,
            Direction::Short => price >= self.stop_price,
        }
    }

    pub fn bars_held(&self, bar_index: u64) -> u64 {
        bar_index.saturating_sub(self.entry_bar_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionState {
    Flat,
    Open(Position),
}

/// A forced exit detected by [`PositionStateMachine::check_candle`] or
/// [`PositionStateMachine::check_tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedExit {
    pub reason: ExitReason,
    pub fill_price: f64,
}

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    instrument: String,
    state: PositionState,
}

impl PositionStateMachine {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            state: PositionState::Flat,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, PositionState::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match &self.state {
            PositionState::Open(p) => Some(p),
            PositionState::Flat => None,
        }
    }

    /// Check an entry against the current state without changing it.
    /// Returns the validated stop.
    pub fn validate_open(
        &self,
        direction: Direction,
        entry_price: f64,
        stop_price: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<f64, TickloomError> {
        if let PositionState::Open(existing) = &self.state {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                format!(
                    "entry {direction} while {} position is open",
                    existing.direction
                ),
            ));
        }
        self.validate_entry(direction, entry_price, stop_price, at)
    }

    /// Price and stop checks for an entry, independent of the current
    /// state. Returns the validated stop.
    pub fn validate_entry(
        &self,
        direction: Direction,
        entry_price: f64,
        stop_price: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<f64, TickloomError> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                format!("entry price {entry_price} is not usable"),
            ));
        }
        let Some(stop) = stop_price else {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                "entry without a stop price",
            ));
        };
        if !stop.is_finite() {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                format!("stop price {stop} is not finite"),
            ));
        }
        let protective = match direction {
            Direction::Long => stop < entry_price,
            Direction::Short => stop > entry_price,
        };
        if !protective {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                format!("{direction} stop {stop} is on the wrong side of entry {entry_price}"),
            ));
        }
        Ok(stop)
    }

    /// `Flat -> Long|Short`. On error the machine is left untouched.
    pub fn open(
        &mut self,
        direction: Direction,
        entry_price: f64,
        stop_price: Option<f64>,
        size: f64,
        at: DateTime<Utc>,
        bar_index: u64,
    ) -> Result<(), TickloomError> {
        let stop_price = self.validate_open(direction, entry_price, stop_price, at)?;
        if !size.is_finite() || size <= 0.0 {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                format!("position size {size} must be positive"),
            ));
        }
        self.state = PositionState::Open(Position {
            instrument: self.instrument.clone(),
            direction,
            entry_price,
            entry_timestamp: at,
            entry_bar_index: bar_index,
            stop_price,
            size,
        });
        Ok(())
    }

    /// `Long|Short -> Flat`, producing the closed trade. A no-op returning
    /// `Ok(None)` when already flat.
    pub fn close(
        &mut self,
        exit_price: f64,
        at: DateTime<Utc>,
        bar_index: u64,
        reason: ExitReason,
    ) -> Result<Option<Trade>, TickloomError> {
        if !exit_price.is_finite() {
            return Err(TickloomError::invariant(
                &self.instrument,
                at,
                format!("exit price {exit_price} is not finite"),
            ));
        }
        let PositionState::Open(position) = std::mem::replace(&mut self.state, PositionState::Flat)
        else {
            return Ok(None);
        };
        Ok(Some(Trade {
            instrument: position.instrument,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl: position.direction.sign() * (exit_price - position.entry_price) * position.size,
            opened_at: position.entry_timestamp,
            closed_at: at,
            bars_held: bar_index.saturating_sub(position.entry_bar_index),
            exit_reason: reason,
        }))
    }

    /// Forced exit check for a completed candle of this instrument.
    ///
    /// The price stop is checked first: it fills at the stop, or at the open
    /// when the bar opened through it. Positions entered inside this bar are
    /// not price-checked against it, since its range predates the entry.
    /// The time stop fills at the close.
    pub fn check_candle(
        &self,
        candle: &Candle,
        bar_open: DateTime<Utc>,
        bar_index: u64,
        max_hold_bars: Option<u64>,
    ) -> Option<ForcedExit> {
        let position = self.position()?;

        if position.entry_timestamp <= bar_open {
            let (touched, gapped) = match position.direction {
                Direction::Long => (
                    candle.low <= position.stop_price,
                    candle.open <= position.stop_price,
                ),
                Direction::Short => (
                    candle.high >= position.stop_price,
                    candle.open >= position.stop_price,
                ),
            };
            if touched {
                let fill_price = if gapped {
                    candle.open
                } else {
                    position.stop_price
                };
                return Some(ForcedExit {
                    reason: ExitReason::PriceStop,
                    fill_price,
                });
            }
        }

        match max_hold_bars {
            Some(max) if position.bars_held(bar_index) >= max => Some(ForcedExit {
                reason: ExitReason::TimeStop,
                fill_price: candle.close,
            }),
            _ => None,
        }
    }

    /// Price stop check against a tick's mid.
    pub fn check_tick(&self, tick: &Tick) -> Option<ForcedExit> {
        let position = self.position()?;
        let mid = tick.mid();
        position.stop_hit(mid).then_some(ForcedExit {
            reason: ExitReason::PriceStop,
            fill_price: mid,
        })
    }
}
