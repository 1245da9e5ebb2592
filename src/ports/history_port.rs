//! Historical candle access used by warmup.

use async_trait::async_trait;

use crate::domain::error::TickloomError;
use crate::domain::market::{Candle, Timeframe};

#[async_trait]
pub trait HistoricalDataProvider: Send + Sync {
    /// Up to `count` most recent completed candles, oldest first.
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, TickloomError>;
}
