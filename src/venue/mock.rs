//! Mock venue client for unit testing and paper trading.
//!
//! Stands in for a real venue adapter without making network requests.
//! Order behavior is scripted per market so tests can exercise rejections,
//! partial fills, and timeouts deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::VenueError;

use super::types::{Listing, ListingStatus, Outcome, VenueId};
use super::{Balance, OrderRequest, OrderResult, VenueClient};

/// Scripted behavior for orders against one market.
#[derive(Debug, Clone)]
pub enum OrderBehavior {
    /// Accept and fill the full quantity at the requested limit price.
    FillAtLimit,
    /// Fill the given fractions of the requested quantity on successive
    /// submissions, then fill the remainder in full.
    PartialFills(Vec<Decimal>),
    /// Reject every order with the given reason.
    Reject(String),
    /// Answer every order with a venue timeout.
    TimeOut,
}

/// Configuration for mock client behavior.
#[derive(Debug, Clone)]
pub struct MockVenueConfig {
    /// Balance to return.
    pub balance: Balance,
    /// Whether to fail listing requests.
    pub fail_listings: bool,
    /// Whether to fail balance requests.
    pub fail_balance: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

impl Default for MockVenueConfig {
    fn default() -> Self {
        Self {
            balance: Balance {
                available: Decimal::new(10_000, 0),
                total: Decimal::new(10_000, 0),
            },
            fail_listings: false,
            fail_balance: false,
            latency_ms: 0,
        }
    }
}

#[derive(Default)]
struct MockState {
    listings: Vec<Listing>,
    behaviors: HashMap<String, OrderBehavior>,
    partial_cursor: HashMap<String, usize>,
    order_log: Vec<OrderRequest>,
    next_order_seq: u64,
}

/// Mock venue client for testing.
#[derive(Clone)]
pub struct MockVenueClient {
    venue: VenueId,
    config: MockVenueConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockVenueClient {
    /// Create a mock venue with default configuration.
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: VenueId::new(venue),
            config: MockVenueConfig::default(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock venue with custom configuration.
    pub fn with_config(venue: impl Into<String>, config: MockVenueConfig) -> Self {
        Self {
            venue: VenueId::new(venue),
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Replace the scripted listing snapshots.
    pub fn set_listings(&self, listings: Vec<Listing>) {
        self.state.lock().unwrap().listings = listings;
    }

    /// Append one scripted listing snapshot.
    pub fn add_listing(&self, listing: Listing) {
        self.state.lock().unwrap().listings.push(listing);
    }

    /// Script order behavior for a market. Unscripted markets fill at limit.
    pub fn set_order_behavior(&self, market_id: impl Into<String>, behavior: OrderBehavior) {
        let mut state = self.state.lock().unwrap();
        let market_id = market_id.into();
        state.partial_cursor.remove(&market_id);
        state.behaviors.insert(market_id, behavior);
    }

    /// Orders received so far, in submission order.
    pub fn order_log(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().order_log.clone()
    }

    /// Drop all scripted data and recorded orders.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = MockState::default();
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

#[async_trait]
impl VenueClient for MockVenueClient {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    async fn get_listings(&self, min_volume: Decimal) -> Result<Vec<Listing>, VenueError> {
        self.simulate_latency().await;

        if self.config.fail_listings {
            return Err(VenueError::Transport {
                venue: self.venue.to_string(),
                reason: "mock listings failure".to_string(),
            });
        }

        let state = self.state.lock().unwrap();
        Ok(state
            .listings
            .iter()
            .filter(|l| l.volume >= min_volume)
            .cloned()
            .collect())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, VenueError> {
        self.simulate_latency().await;

        if let Err(reason) = request.validate() {
            return Ok(OrderResult::rejected(reason));
        }

        let mut state = self.state.lock().unwrap();
        state.order_log.push(request.clone());
        state.next_order_seq += 1;
        let order_id = format!("{}-{}", self.venue, state.next_order_seq);

        let behavior = state
            .behaviors
            .get(&request.market_id)
            .cloned()
            .unwrap_or(OrderBehavior::FillAtLimit);

        match behavior {
            OrderBehavior::FillAtLimit => Ok(OrderResult::filled(
                order_id,
                request.quantity,
                request.limit_price,
            )),
            OrderBehavior::PartialFills(fractions) => {
                let cursor = state
                    .partial_cursor
                    .entry(request.market_id.clone())
                    .or_insert(0);
                let fill = match fractions.get(*cursor) {
                    Some(fraction) => request.quantity * *fraction,
                    None => request.quantity,
                };
                *cursor += 1;
                Ok(OrderResult::filled(order_id, fill, request.limit_price))
            }
            OrderBehavior::Reject(reason) => Ok(OrderResult::rejected(reason)),
            OrderBehavior::TimeOut => Err(VenueError::Timeout {
                venue: self.venue.to_string(),
                elapsed_ms: self.config.latency_ms,
            }),
        }
    }

    async fn get_balance(&self) -> Result<Balance, VenueError> {
        self.simulate_latency().await;

        if self.config.fail_balance {
            return Err(VenueError::Transport {
                venue: self.venue.to_string(),
                reason: "mock balance failure".to_string(),
            });
        }

        Ok(self.config.balance)
    }
}

/// Builder for listing snapshots with sensible defaults.
pub struct ListingBuilder {
    listing: Listing,
}

impl ListingBuilder {
    /// New open listing on the given venue.
    pub fn new(venue: impl Into<String>, market_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            listing: Listing {
                venue: VenueId::new(venue),
                market_id: market_id.into(),
                title: title.into(),
                yes_price: Decimal::new(50, 2),
                no_price: Decimal::new(50, 2),
                volume: Decimal::new(1_000, 0),
                liquidity: Decimal::new(500, 0),
                status: ListingStatus::Open,
                close_time: None,
            },
        }
    }

    /// Set YES and NO prices.
    pub fn prices(mut self, yes: Decimal, no: Decimal) -> Self {
        self.listing.yes_price = yes;
        self.listing.no_price = no;
        self
    }

    /// Set the price of one outcome.
    pub fn price(mut self, outcome: Outcome, price: Decimal) -> Self {
        match outcome {
            Outcome::Yes => self.listing.yes_price = price,
            Outcome::No => self.listing.no_price = price,
        }
        self
    }

    /// Set traded volume.
    pub fn volume(mut self, volume: Decimal) -> Self {
        self.listing.volume = volume;
        self
    }

    /// Set available liquidity.
    pub fn liquidity(mut self, liquidity: Decimal) -> Self {
        self.listing.liquidity = liquidity;
        self
    }

    /// Set lifecycle status.
    pub fn status(mut self, status: ListingStatus) -> Self {
        self.listing.status = status;
        self
    }

    /// Finish the listing.
    pub fn build(self) -> Listing {
        self.listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::Side;
    use rust_decimal_macros::dec;

    fn order(market_id: &str) -> OrderRequest {
        OrderRequest {
            market_id: market_id.to_string(),
            outcome: Outcome::Yes,
            side: Side::Buy,
            quantity: dec!(100),
            limit_price: dec!(0.40),
        }
    }

    #[tokio::test]
    async fn fills_at_limit_by_default() {
        let client = MockVenueClient::new("alpha");
        let result = client.place_order(&order("mkt-1")).await.unwrap();

        assert!(result.accepted);
        assert_eq!(result.filled_quantity, dec!(100));
        assert_eq!(result.average_fill_price, dec!(0.40));
        assert_eq!(client.order_log().len(), 1);
    }

    #[tokio::test]
    async fn scripted_rejection() {
        let client = MockVenueClient::new("alpha");
        client.set_order_behavior("mkt-1", OrderBehavior::Reject("post-only cross".to_string()));

        let result = client.place_order(&order("mkt-1")).await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.failure_reason.as_deref(), Some("post-only cross"));
    }

    #[tokio::test]
    async fn partial_fill_sequence() {
        let client = MockVenueClient::new("alpha");
        client.set_order_behavior("mkt-1", OrderBehavior::PartialFills(vec![dec!(0.5)]));

        let first = client.place_order(&order("mkt-1")).await.unwrap();
        assert_eq!(first.filled_quantity, dec!(50));

        // Fractions exhausted: remainder fills in full.
        let second = client.place_order(&order("mkt-1")).await.unwrap();
        assert_eq!(second.filled_quantity, dec!(100));
    }

    #[tokio::test]
    async fn listings_filtered_by_volume() {
        let client = MockVenueClient::new("alpha");
        client.add_listing(
            ListingBuilder::new("alpha", "thin", "Thin market")
                .volume(dec!(10))
                .build(),
        );
        client.add_listing(
            ListingBuilder::new("alpha", "thick", "Thick market")
                .volume(dec!(5000))
                .build(),
        );

        let listings = client.get_listings(dec!(100)).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].market_id, "thick");
    }

    #[tokio::test]
    async fn failure_modes() {
        let client = MockVenueClient::with_config(
            "alpha",
            MockVenueConfig {
                fail_balance: true,
                ..Default::default()
            },
        );
        assert!(client.get_balance().await.is_err());
        assert!(client.get_listings(Decimal::ZERO).await.is_ok());
    }
}
