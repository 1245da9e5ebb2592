//! In-memory historical candle provider.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::error::TickloomError;
use crate::domain::market::{Candle, Timeframe};
use crate::ports::history_port::HistoricalDataProvider;

/// Serves preloaded candles per (instrument, timeframe). Unknown feeds
/// return an empty history rather than an error, matching a broker that has
/// nothing yet for a freshly listed instrument.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistory {
    candles: HashMap<(String, Timeframe), Vec<Candle>>,
    failing: HashMap<String, String>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(
        mut self,
        instrument: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Self {
        self.candles.insert((instrument.into(), timeframe), candles);
        self
    }

    /// Every request for `instrument` fails with a `Data` error.
    pub fn with_failure(mut self, instrument: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failing.insert(instrument.into(), reason.into());
        self
    }
}

#[async_trait]
impl HistoricalDataProvider for InMemoryHistory {
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, TickloomError> {
        if let Some(reason) = self.failing.get(instrument) {
            return Err(TickloomError::data(instrument, None, reason.clone()));
        }
        let Some(candles) = self.candles.get(&(instrument.to_string(), timeframe)) else {
            return Ok(Vec::new());
        };
        let skip = candles.len().saturating_sub(count);
        Ok(candles[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let p = 1.0 + i as f64;
                Candle {
                    timestamp: start + Duration::hours(i as i64),
                    open: p,
                    high: p,
                    low: p,
                    close: p,
                    volume: 0.0,
                    tick_count: 0,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn returns_latest_count() {
        let history = InMemoryHistory::new().with_candles("EURUSD", Timeframe::Hour, candles(10));
        let got = history.get_candles("EURUSD", Timeframe::Hour, 3).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].close, 8.0);
        assert_eq!(got[2].close, 10.0);
    }

    #[tokio::test]
    async fn short_history_returns_everything() {
        let history = InMemoryHistory::new().with_candles("EURUSD", Timeframe::Hour, candles(2));
        let got = history.get_candles("EURUSD", Timeframe::Hour, 50).await.unwrap();
        assert_eq!(got.len(), 2);
        assert!(history
            .get_candles("EURUSD", Timeframe::Day, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failure_is_data_error() {
        let history = InMemoryHistory::new().with_failure("GBPUSD", "broker offline");
        let err = history.get_candles("GBPUSD", Timeframe::Hour, 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
