//! Feed subscriptions and the per-strategy subscription registry.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::error::TickloomError;
use crate::domain::market::{MarketEvent, Timeframe};

/// Kind of feed: raw ticks or completed candles at a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKind {
    Market,
    Chart(Timeframe),
}

/// One (instrument, feed kind) pair a strategy can register for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription {
    pub instrument: String,
    pub kind: FeedKind,
}

impl Subscription {
    pub fn market(instrument: impl Into<String>) -> Self {
        Subscription {
            instrument: instrument.into(),
            kind: FeedKind::Market,
        }
    }

    pub fn chart(instrument: impl Into<String>, timeframe: Timeframe) -> Self {
        Subscription {
            instrument: instrument.into(),
            kind: FeedKind::Chart(timeframe),
        }
    }

    pub fn timeframe(&self) -> Option<Timeframe> {
        match self.kind {
            FeedKind::Market => None,
            FeedKind::Chart(tf) => Some(tf),
        }
    }

    pub fn is_chart(&self) -> bool {
        matches!(self.kind, FeedKind::Chart(_))
    }

    /// Whether `event` belongs to this feed.
    pub fn matches(&self, event: &MarketEvent) -> bool {
        match (self.kind, event) {
            (FeedKind::Market, MarketEvent::Tick(t)) => t.instrument == self.instrument,
            (FeedKind::Chart(tf), MarketEvent::CandleClose(c)) => {
                c.timeframe == tf && c.instrument == self.instrument
            }
            _ => false,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FeedKind::Market => write!(f, "MARKET:{}", self.instrument),
            FeedKind::Chart(tf) => write!(f, "CHART:{}:{}", self.instrument, tf),
        }
    }
}

/// The feeds one strategy registered, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionRegistry {
    /// Build a registry, rejecting duplicate subscriptions.
    pub fn new(subscriptions: Vec<Subscription>) -> Result<Self, TickloomError> {
        let mut seen = BTreeSet::new();
        for sub in &subscriptions {
            if !seen.insert(sub) {
                return Err(TickloomError::configuration(format!(
                    "duplicate subscription {sub}"
                )));
            }
        }
        Ok(Self { subscriptions })
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    pub fn contains(&self, sub: &Subscription) -> bool {
        self.subscriptions.contains(sub)
    }

    pub fn charts(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().filter(|s| s.is_chart())
    }

    /// Whether any registered feed matches the event.
    pub fn matches(&self, event: &MarketEvent) -> bool {
        self.subscriptions.iter().any(|s| s.matches(event))
    }

    /// Distinct instruments, in first-registration order.
    pub fn instruments(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.subscriptions
            .iter()
            .filter(|s| seen.insert(s.instrument.as_str()))
            .map(|s| s.instrument.clone())
            .collect()
    }

    /// Instruments that have more than one chart timeframe.
    pub fn instruments_with_multiple_charts(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut repeated = BTreeSet::new();
        for sub in self.charts() {
            if !seen.insert(sub.instrument.as_str()) {
                repeated.insert(sub.instrument.clone());
            }
        }
        repeated.into_iter().collect()
    }

    /// Sorted, de-duplicated set of feeds across several registries.
    pub fn union<'a>(registries: impl IntoIterator<Item = &'a SubscriptionRegistry>) -> Vec<Subscription> {
        let all: BTreeSet<Subscription> = registries
            .into_iter()
            .flat_map(|r| r.subscriptions.iter().cloned())
            .collect();
        all.into_iter().collect()
    }
}
