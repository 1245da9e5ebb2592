//! Order placement ports.

use async_trait::async_trait;

use crate::domain::error::TickloomError;
use crate::domain::execution::{DealReference, OrderRequest};

#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Place a market order. A rejection is an `Execution` error.
    async fn place_order(&self, request: &OrderRequest) -> Result<DealReference, TickloomError>;
}

/// Blocking counterpart used by the single-threaded backtest loop.
pub trait SyncExecutionGateway {
    fn execute(&self, request: &OrderRequest) -> Result<DealReference, TickloomError>;
}
