//! Stateless pre-trade gate.
//!
//! Every opportunity passes through here before it reaches the position
//! manager. Rejection is an expected, frequent outcome — it is reported as a
//! structured reason, never as an error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::scorer::Opportunity;

/// Why an opportunity was turned away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rejection {
    /// Adjusted edge is zero or negative.
    NotProfitable {
        /// The non-positive net profit per unit.
        net_profit_per_unit: Decimal,
    },
    /// Edge exists but is below the configured minimum.
    BelowProfitThreshold {
        /// The observed net profit per unit.
        net_profit_per_unit: Decimal,
        /// The configured minimum.
        minimum: Decimal,
    },
    /// Match confidence below the configured minimum.
    LowConfidence {
        /// Observed confidence.
        confidence: f64,
        /// Configured minimum.
        minimum: f64,
    },
    /// Tradable quantity below the configured minimum.
    InsufficientLiquidity {
        /// Liquidity-bounded quantity.
        available: Decimal,
        /// Configured minimum quantity.
        minimum: Decimal,
    },
    /// Not enough free cash to fund the buy leg.
    InsufficientCapital {
        /// Capital the trade needs.
        required: Decimal,
        /// Capital available.
        available: Decimal,
    },
    /// The opportunity's expiry has passed.
    Expired {
        /// When it expired.
        expired_at: OffsetDateTime,
    },
    /// One of the listings is no longer open.
    MarketNotOpen {
        /// Venue of the closed listing.
        venue: String,
        /// Its market id.
        market_id: String,
    },
    /// Prices failed basic sanity checks.
    MalformedPricing {
        /// What was wrong.
        reason: String,
    },
}

impl Rejection {
    /// Short stable label for metrics and histograms.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::NotProfitable { .. } => "not_profitable",
            Rejection::BelowProfitThreshold { .. } => "below_profit_threshold",
            Rejection::LowConfidence { .. } => "low_confidence",
            Rejection::InsufficientLiquidity { .. } => "insufficient_liquidity",
            Rejection::InsufficientCapital { .. } => "insufficient_capital",
            Rejection::Expired { .. } => "expired",
            Rejection::MarketNotOpen { .. } => "market_not_open",
            Rejection::MalformedPricing { .. } => "malformed_pricing",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotProfitable { net_profit_per_unit } => {
                write!(f, "not profitable: net {} per unit", net_profit_per_unit)
            }
            Rejection::BelowProfitThreshold {
                net_profit_per_unit,
                minimum,
            } => write!(
                f,
                "profit {} per unit below minimum {}",
                net_profit_per_unit, minimum
            ),
            Rejection::LowConfidence { confidence, minimum } => {
                write!(f, "confidence {:.3} below minimum {:.3}", confidence, minimum)
            }
            Rejection::InsufficientLiquidity { available, minimum } => {
                write!(f, "quantity {} below minimum {}", available, minimum)
            }
            Rejection::InsufficientCapital { required, available } => {
                write!(f, "need {} capital, have {}", required, available)
            }
            Rejection::Expired { expired_at } => write!(f, "expired at {}", expired_at),
            Rejection::MarketNotOpen { venue, market_id } => {
                write!(f, "market {} on {} is not open", market_id, venue)
            }
            Rejection::MalformedPricing { reason } => write!(f, "malformed pricing: {}", reason),
        }
    }
}

/// Inputs the gate needs beyond the opportunity itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    /// Minimum acceptable net profit per unit.
    pub min_profit_per_unit: Decimal,
    /// Minimum acceptable match confidence.
    pub min_confidence: f64,
    /// Minimum tradable quantity.
    pub min_quantity: Decimal,
    /// Free cash available to fund the buy leg.
    pub available_capital: Decimal,
    /// Clock for expiry checks.
    pub now: OffsetDateTime,
}

/// Run every pre-trade check against an opportunity.
///
/// Checks run in a fixed order and the first failure wins, so rejection
/// reasons are deterministic for identical inputs.
pub fn validate(opportunity: &Opportunity, ctx: &ValidationContext) -> Result<(), Rejection> {
    for listing in [&opportunity.buy, &opportunity.sell] {
        if !listing.is_open() {
            return Err(Rejection::MarketNotOpen {
                venue: listing.venue.to_string(),
                market_id: listing.market_id.clone(),
            });
        }
    }

    for (name, price) in [
        ("buy price", opportunity.buy_price),
        ("sell price", opportunity.sell_price),
    ] {
        if price < Decimal::ZERO || price > Decimal::ONE {
            return Err(Rejection::MalformedPricing {
                reason: format!("{} {} outside [0, 1]", name, price),
            });
        }
    }

    if let Some(expires_at) = opportunity.expires_at {
        if expires_at <= ctx.now {
            return Err(Rejection::Expired {
                expired_at: expires_at,
            });
        }
    }

    if !opportunity.is_profitable() {
        return Err(Rejection::NotProfitable {
            net_profit_per_unit: opportunity.net_profit_per_unit,
        });
    }

    if opportunity.net_profit_per_unit < ctx.min_profit_per_unit {
        return Err(Rejection::BelowProfitThreshold {
            net_profit_per_unit: opportunity.net_profit_per_unit,
            minimum: ctx.min_profit_per_unit,
        });
    }

    if opportunity.confidence < ctx.min_confidence {
        return Err(Rejection::LowConfidence {
            confidence: opportunity.confidence,
            minimum: ctx.min_confidence,
        });
    }

    if opportunity.max_quantity < ctx.min_quantity {
        return Err(Rejection::InsufficientLiquidity {
            available: opportunity.max_quantity,
            minimum: ctx.min_quantity,
        });
    }

    let required = opportunity.required_capital(ctx.min_quantity.max(Decimal::ONE));
    if required > ctx.available_capital {
        return Err(Rejection::InsufficientCapital {
            required,
            available: ctx.available_capital,
        });
    }

    debug!(opportunity = %opportunity.describe(), "opportunity passed validation");
    Ok(())
}
