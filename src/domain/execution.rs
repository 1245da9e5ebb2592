//! Order requests exchanged with an execution gateway.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::ledger::ExitReason;
use crate::domain::position::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPurpose {
    Entry,
    Exit(ExitReason),
}

impl fmt::Display for OrderPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPurpose::Entry => f.write_str("entry"),
            OrderPurpose::Exit(reason) => write!(f, "exit ({reason})"),
        }
    }
}

/// A market order. `direction` is the side of the order itself, so an exit
/// from a long is a `Short` order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    pub direction: Direction,
    pub size: f64,
    pub purpose: OrderPurpose,
    pub timestamp: DateTime<Utc>,
}

/// Gateway-issued identifier for an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DealReference(pub String);

impl fmt::Display for DealReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An order the gateway refused or did not confirm in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub purpose: OrderPurpose,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_display() {
        assert_eq!(OrderPurpose::Entry.to_string(), "entry");
        assert_eq!(
            OrderPurpose::Exit(ExitReason::PriceStop).to_string(),
            "exit (price_stop)"
        );
        assert_eq!(DealReference("SIM-1".into()).to_string(), "SIM-1");
    }
}
