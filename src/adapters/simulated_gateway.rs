//! Paper execution gateway used by backtests and dry runs.
//!
//! Every order is accepted immediately unless its instrument has been marked
//! as rejected. Deal references are `SIM-<n>`, numbered from 1 in the order
//! the gateway saw the requests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::error::TickloomError;
use crate::domain::execution::{DealReference, OrderRequest};
use crate::ports::execution_port::{ExecutionGateway, SyncExecutionGateway};

#[derive(Debug, Default)]
pub struct SimulatedGateway {
    next_deal: AtomicU64,
    rejected: HashSet<String>,
    orders: Mutex<Vec<OrderRequest>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every order for `instrument`.
    pub fn reject_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.rejected.insert(instrument.into());
        self
    }

    /// Accepted orders so far, in placement order.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders
            .lock()
            .map(|orders| orders.clone())
            .unwrap_or_default()
    }

    fn fill(&self, request: &OrderRequest) -> Result<DealReference, TickloomError> {
        if self.rejected.contains(&request.instrument) {
            warn!(
                instrument = %request.instrument,
                purpose = %request.purpose,
                "simulated gateway rejected order"
            );
            return Err(TickloomError::execution(
                &request.instrument,
                request.timestamp,
                format!("{} order rejected by simulated gateway", request.purpose),
            ));
        }
        let n = self.next_deal.fetch_add(1, Ordering::Relaxed) + 1;
        let deal = DealReference(format!("SIM-{n}"));
        if let Ok(mut orders) = self.orders.lock() {
            orders.push(request.clone());
        }
        debug!(
            instrument = %request.instrument,
            direction = %request.direction,
            size = request.size,
            %deal,
            "simulated fill"
        );
        Ok(deal)
    }
}

impl SyncExecutionGateway for SimulatedGateway {
    fn execute(&self, request: &OrderRequest) -> Result<DealReference, TickloomError> {
        self.fill(request)
    }
}

#[async_trait]
impl ExecutionGateway for SimulatedGateway {
    async fn place_order(&self, request: &OrderRequest) -> Result<DealReference, TickloomError> {
        self.fill(request)
    }
}
