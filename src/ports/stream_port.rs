//! Live market data transport.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::error::TickloomError;
use crate::domain::market::MarketEvent;
use crate::domain::subscription::Subscription;

#[async_trait]
pub trait LiveStreamAdapter: Send + Sync {
    /// Start a feed. Events arrive on the returned channel in transport
    /// order; the channel closes when the feed ends.
    async fn subscribe(
        &self,
        subscription: &Subscription,
    ) -> Result<mpsc::Receiver<MarketEvent>, TickloomError>;

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), TickloomError>;
}
