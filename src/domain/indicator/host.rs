//! Indicator host: fans each candle of a chart subscription out to the
//! indicators registered on it, in registration order.

use crate::domain::indicator::{Indicator, IndicatorValue};
use crate::domain::market::Candle;
use crate::domain::subscription::Subscription;

/// Opaque reference to a registered indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndicatorHandle(usize);

struct Registered {
    subscription: Subscription,
    indicator: Box<dyn Indicator>,
    last: Option<IndicatorValue>,
}

#[derive(Default)]
pub struct IndicatorHost {
    entries: Vec<Registered>,
}

impl IndicatorHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        subscription: Subscription,
        indicator: Box<dyn Indicator>,
    ) -> IndicatorHandle {
        self.entries.push(Registered {
            subscription,
            indicator,
            last: None,
        });
        IndicatorHandle(self.entries.len() - 1)
    }

    /// Update every indicator registered on `subscription`. Returns how many
    /// were updated.
    pub fn update(&mut self, subscription: &Subscription, candle: &Candle) -> usize {
        let mut updated = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| &e.subscription == subscription)
        {
            entry.last = entry.indicator.update(candle);
            updated += 1;
        }
        updated
    }

    /// Last value of a ready indicator; `None` while warming up.
    pub fn value(&self, handle: IndicatorHandle) -> Option<&IndicatorValue> {
        let entry = self.entries.get(handle.0)?;
        if !entry.indicator.ready() {
            return None;
        }
        entry.last.as_ref()
    }

    pub fn is_ready(&self, handle: IndicatorHandle) -> bool {
        self.entries
            .get(handle.0)
            .is_some_and(|e| e.indicator.ready())
    }

    pub fn label(&self, handle: IndicatorHandle) -> Option<String> {
        self.entries.get(handle.0).map(|e| e.indicator.label())
    }

    /// Largest warmup among indicators on `subscription`, 0 if none.
    pub fn max_warmup(&self, subscription: &Subscription) -> usize {
        self.entries
            .iter()
            .filter(|e| &e.subscription == subscription)
            .map(|e| e.indicator.warmup_periods())
            .max()
            .unwrap_or(0)
    }

    /// Whether every indicator on `subscription` is ready.
    pub fn all_ready(&self, subscription: &Subscription) -> bool {
        self.entries
            .iter()
            .filter(|e| &e.subscription == subscription)
            .all(|e| e.indicator.ready())
    }

    /// Distinct subscriptions with indicators, in first-registration order.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut out: Vec<Subscription> = Vec::new();
        for entry in &self.entries {
            if !out.contains(&entry.subscription) {
                out.push(entry.subscription.clone());
            }
        }
        out
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.indicator.reset();
            entry.last = None;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for IndicatorHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| format!("{} on {}", e.indicator.label(), e.subscription)),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::bars;
    use crate::domain::indicator::{Ema, Sma};
    use crate::domain::market::Timeframe;

    fn chart(instrument: &str) -> Subscription {
        Subscription::chart(instrument, Timeframe::FiveMinute)
    }

    struct OrderLog {
        log: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Indicator for OrderLog {
        fn update(&mut self, _candle: &Candle) -> Option<IndicatorValue> {
            self.log.lock().unwrap().push(self.name);
            Some(IndicatorValue::Simple(0.0))
        }
        fn ready(&self) -> bool {
            true
        }
        fn reset(&mut self) {}
        fn warmup_periods(&self) -> usize {
            1
        }
        fn label(&self) -> String {
            self.name.to_string()
        }
    }

    #[test]
    fn updates_in_registration_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut host = IndicatorHost::new();
        for name in ["first", "second", "third"] {
            host.register(
                chart("EURUSD"),
                Box::new(OrderLog {
                    log: log.clone(),
                    name,
                }),
            );
        }
        host.update(&chart("EURUSD"), &bars(&[1.0])[0]);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_subscription_updates() {
        let mut host = IndicatorHost::new();
        let a = host.register(chart("EURUSD"), Box::new(Sma::new(1).unwrap()));
        let b = host.register(chart("GBPUSD"), Box::new(Sma::new(1).unwrap()));
        assert_eq!(host.update(&chart("EURUSD"), &bars(&[3.0])[0]), 1);
        assert_eq!(host.value(a), Some(&IndicatorValue::Simple(3.0)));
        assert_eq!(host.value(b), None);
    }

    #[test]
    fn value_gated_on_ready() {
        let mut host = IndicatorHost::new();
        let h = host.register(chart("EURUSD"), Box::new(Sma::new(2).unwrap()));
        let candles = bars(&[1.0, 3.0]);
        host.update(&chart("EURUSD"), &candles[0]);
        assert!(!host.is_ready(h));
        assert_eq!(host.value(h), None);
        host.update(&chart("EURUSD"), &candles[1]);
        assert_eq!(host.value(h), Some(&IndicatorValue::Simple(2.0)));
    }

    #[test]
    fn max_warmup_per_subscription() {
        let mut host = IndicatorHost::new();
        host.register(chart("EURUSD"), Box::new(Sma::new(5).unwrap()));
        host.register(chart("EURUSD"), Box::new(Ema::new(9).unwrap()));
        assert_eq!(host.max_warmup(&chart("EURUSD")), 9);
        assert_eq!(host.max_warmup(&chart("GBPUSD")), 0);
        assert_eq!(host.subscriptions(), vec![chart("EURUSD")]);
    }

    #[test]
    fn reset_clears_values() {
        let mut host = IndicatorHost::new();
        let h = host.register(chart("EURUSD"), Box::new(Sma::new(1).unwrap()));
        host.update(&chart("EURUSD"), &bars(&[3.0])[0]);
        host.reset();
        assert_eq!(host.value(h), None);
        assert!(!host.all_ready(&chart("EURUSD")));
    }
}
