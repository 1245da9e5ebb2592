//! Ordered market event stream shared by live and replay modes.

use async_trait::async_trait;

use crate::domain::error::TickloomError;
use crate::domain::market::MarketEvent;
use crate::domain::replay::{ReplayProperties, ReplaySource};

#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` at end of stream.
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, TickloomError>;

    /// Release the underlying feeds.
    async fn close(&mut self) -> Result<(), TickloomError>;

    /// Replay settings, when the events are historical.
    fn replay_properties(&self) -> Option<&ReplayProperties> {
        None
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, TickloomError> {
        Ok(self.next())
    }

    async fn close(&mut self) -> Result<(), TickloomError> {
        Ok(())
    }

    fn replay_properties(&self) -> Option<&ReplayProperties> {
        Some(self.properties())
    }
}
