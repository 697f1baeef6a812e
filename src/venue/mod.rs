//! Venue collaborator boundary.
//!
//! The engine is venue-agnostic: everything upstream of order entry talks to
//! a [`VenueClient`] trait object, never to a concrete venue implementation.
//! Concrete HTTP adapters live outside this crate; [`mock::MockVenueClient`]
//! stands in for them in tests and paper trading.

pub mod mock;
pub mod types;

pub use types::{Listing, ListingStatus, Outcome, Side, VenueId};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VenueError;

/// Parameters for a single order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Venue-native market identifier.
    pub market_id: String,
    /// Which outcome token to trade.
    pub outcome: Outcome,
    /// Buy or sell.
    pub side: Side,
    /// Quantity of contracts.
    pub quantity: Decimal,
    /// Limit price per contract.
    pub limit_price: Decimal,
}

impl OrderRequest {
    /// Validate order parameters before submission.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.market_id.is_empty() {
            return Err("market_id is required".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Err("quantity must be positive".to_string());
        }
        if self.limit_price <= Decimal::ZERO || self.limit_price > Decimal::ONE {
            return Err(format!("limit price {} outside (0, 1]", self.limit_price));
        }
        Ok(())
    }
}

/// Outcome of one order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    /// Whether the venue accepted the order.
    pub accepted: bool,
    /// Venue-assigned order id, when accepted.
    pub order_id: Option<String>,
    /// Quantity filled (may be less than requested).
    pub filled_quantity: Decimal,
    /// Average price of the filled quantity.
    pub average_fill_price: Decimal,
    /// Reason the order was not (fully) accepted.
    pub failure_reason: Option<String>,
}

impl OrderResult {
    /// A rejection with the given reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            order_id: None,
            filled_quantity: Decimal::ZERO,
            average_fill_price: Decimal::ZERO,
            failure_reason: Some(reason.into()),
        }
    }

    /// An acceptance filled at a single price.
    pub fn filled(order_id: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            accepted: true,
            order_id: Some(order_id.into()),
            filled_quantity: quantity,
            average_fill_price: price,
            failure_reason: None,
        }
    }
}

/// Cash balance on one venue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    /// Free cash available for new orders.
    pub available: Decimal,
    /// Total cash including amounts locked in open orders.
    pub total: Decimal,
}

/// Order-entry and market-data interface implemented per venue.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Identifier of this venue.
    fn venue(&self) -> &VenueId;

    /// Fetch open-market snapshots with at least `min_volume` traded.
    async fn get_listings(&self, min_volume: Decimal) -> Result<Vec<Listing>, VenueError>;

    /// Submit one order.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, VenueError>;

    /// Fetch the cash balance.
    async fn get_balance(&self) -> Result<Balance, VenueError>;
}

/// Explicit venue registry built at startup and passed into the Coordinator.
///
/// Replaces any notion of a process-wide mutable registry: the set of venues
/// is fixed once constructed.
#[derive(Clone, Default)]
pub struct VenueRegistry {
    clients: HashMap<VenueId, Arc<dyn VenueClient>>,
}

impl VenueRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a venue client under its own id.
    pub fn register(&mut self, client: Arc<dyn VenueClient>) {
        self.clients.insert(client.venue().clone(), client);
    }

    /// Look up a client by venue id.
    pub fn get(&self, venue: &VenueId) -> Option<Arc<dyn VenueClient>> {
        self.clients.get(venue).cloned()
    }

    /// All registered venue ids, sorted for deterministic iteration.
    pub fn venues(&self) -> Vec<VenueId> {
        let mut ids: Vec<VenueId> = self.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered venues.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_request_validation() {
        let mut req = OrderRequest {
            market_id: "mkt-1".to_string(),
            outcome: Outcome::Yes,
            side: Side::Buy,
            quantity: dec!(10),
            limit_price: dec!(0.45),
        };
        assert!(req.validate().is_ok());

        req.quantity = Decimal::ZERO;
        assert!(req.validate().is_err());

        req.quantity = dec!(10);
        req.limit_price = dec!(1.5);
        assert!(req.validate().is_err());
    }

    #[test]
    fn registry_lookup_and_ordering() {
        let mut registry = VenueRegistry::new();
        registry.register(Arc::new(mock::MockVenueClient::new("beta")));
        registry.register(Arc::new(mock::MockVenueClient::new("alpha")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&VenueId::new("alpha")).is_some());
        assert!(registry.get(&VenueId::new("missing")).is_none());
        let names: Vec<String> = registry
            .venues()
            .into_iter()
            .map(|v| v.0)
            .collect();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }
}
