//! Normalized per-venue market types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Identifier for a trading venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct VenueId(pub String);

impl VenueId {
    /// Create a venue id from any string-ish value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The venue name as a str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Binary contract outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// The YES side of the contract.
    #[default]
    #[strum(serialize = "YES", serialize = "yes")]
    Yes,
    /// The NO side of the contract.
    #[strum(serialize = "NO", serialize = "no")]
    No,
}

impl Outcome {
    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    /// Both outcomes, in scoring order.
    pub const ALL: [Outcome; 2] = [Outcome::Yes, Outcome::No];
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(serialize = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(serialize = "SELL", serialize = "sell")]
    Sell,
}

/// Lifecycle status of a listing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingStatus {
    /// Accepting orders.
    #[default]
    #[strum(serialize = "OPEN", serialize = "open")]
    Open,
    /// No longer accepting orders, not yet settled.
    #[strum(serialize = "CLOSED", serialize = "closed")]
    Closed,
    /// Outcome resolved and paid out.
    #[strum(serialize = "SETTLED", serialize = "settled")]
    Settled,
}

/// Normalized snapshot of a binary-outcome market on one venue.
///
/// Produced by a venue collaborator on each poll. Snapshots are immutable;
/// the next poll supersedes them rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Venue this snapshot came from.
    pub venue: VenueId,
    /// Venue-native market identifier.
    pub market_id: String,
    /// Market title as shown by the venue.
    pub title: String,
    /// Price of the YES outcome, in [0, 1].
    pub yes_price: Decimal,
    /// Price of the NO outcome, in [0, 1].
    pub no_price: Decimal,
    /// Total traded volume.
    pub volume: Decimal,
    /// Liquidity available to take.
    pub liquidity: Decimal,
    /// Lifecycle status.
    pub status: ListingStatus,
    /// Scheduled close time, when the venue publishes one.
    pub close_time: Option<OffsetDateTime>,
}

impl Listing {
    /// Price of the given outcome.
    pub fn price(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Yes => self.yes_price,
            Outcome::No => self.no_price,
        }
    }

    /// Whether the listing is accepting orders.
    pub fn is_open(&self) -> bool {
        self.status == ListingStatus::Open
    }

    /// Validate snapshot fields.
    ///
    /// Prices must lie in [0, 1]; volume and liquidity must be non-negative.
    /// Callers skip invalid snapshots and continue the batch.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.market_id.is_empty() {
            return Err("empty market id".to_string());
        }
        for (name, price) in [("yes_price", self.yes_price), ("no_price", self.no_price)] {
            if price < Decimal::ZERO || price > Decimal::ONE {
                return Err(format!("{} {} outside [0, 1]", name, price));
            }
        }
        if self.volume < Decimal::ZERO {
            return Err(format!("negative volume {}", self.volume));
        }
        if self.liquidity < Decimal::ZERO {
            return Err(format!("negative liquidity {}", self.liquidity));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listing(yes: Decimal, no: Decimal) -> Listing {
        Listing {
            venue: VenueId::new("alpha"),
            market_id: "mkt-1".to_string(),
            title: "Will it rain tomorrow".to_string(),
            yes_price: yes,
            no_price: no,
            volume: dec!(1000),
            liquidity: dec!(500),
            status: ListingStatus::Open,
            close_time: None,
        }
    }

    #[test]
    fn price_by_outcome() {
        let l = listing(dec!(0.40), dec!(0.62));
        assert_eq!(l.price(Outcome::Yes), dec!(0.40));
        assert_eq!(l.price(Outcome::No), dec!(0.62));
    }

    #[test]
    fn validate_accepts_well_formed_snapshot() {
        assert!(listing(dec!(0.40), dec!(0.60)).validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_price() {
        assert!(listing(dec!(1.20), dec!(0.60)).validate().is_err());
        assert!(listing(dec!(-0.10), dec!(0.60)).validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_liquidity() {
        let mut l = listing(dec!(0.40), dec!(0.60));
        l.liquidity = dec!(-1);
        assert!(l.validate().is_err());
    }

    #[test]
    fn outcome_opposite() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
    }
}
