//! Fee- and slippage-adjusted opportunity scoring.
//!
//! Turns matched listing pairs into sized arbitrage opportunities. Scoring is
//! a pure function: identical inputs always produce identical output, modulo
//! nothing — the final sort is deterministic too.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::matcher::MatchedPair;
use crate::venue::{Listing, Outcome, VenueId};

/// Per-venue taker fee rates over a default.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    default_pct: Decimal,
    per_venue: HashMap<VenueId, Decimal>,
}

impl FeeSchedule {
    /// Flat fee rate for every venue.
    pub fn flat(default_pct: Decimal) -> Self {
        Self {
            default_pct,
            per_venue: HashMap::new(),
        }
    }

    /// Override the rate for one venue.
    pub fn with_venue(mut self, venue: VenueId, pct: Decimal) -> Self {
        self.per_venue.insert(venue, pct);
        self
    }

    /// Fee rate for a venue (fraction, e.g. 0.02 = 2%).
    pub fn fee_for(&self, venue: &VenueId) -> Decimal {
        self.per_venue.get(venue).copied().unwrap_or(self.default_pct)
    }
}

/// Per-venue expected slippage over a default. Slippage always moves the
/// price against the taker.
#[derive(Debug, Clone, Default)]
pub struct SlippageModel {
    default_pct: Decimal,
    per_venue: HashMap<VenueId, Decimal>,
}

impl SlippageModel {
    /// Flat slippage rate for every venue.
    pub fn flat(default_pct: Decimal) -> Self {
        Self {
            default_pct,
            per_venue: HashMap::new(),
        }
    }

    /// Override the rate for one venue.
    pub fn with_venue(mut self, venue: VenueId, pct: Decimal) -> Self {
        self.per_venue.insert(venue, pct);
        self
    }

    /// Slippage rate for a venue (fraction).
    pub fn slippage_for(&self, venue: &VenueId) -> Decimal {
        self.per_venue.get(venue).copied().unwrap_or(self.default_pct)
    }

    /// Price a taker pays when buying at `price`.
    pub fn adjusted_buy(&self, venue: &VenueId, price: Decimal) -> Decimal {
        price * (Decimal::ONE + self.slippage_for(venue))
    }

    /// Price a taker receives when selling at `price`.
    pub fn adjusted_sell(&self, venue: &VenueId, price: Decimal) -> Decimal {
        price * (Decimal::ONE - self.slippage_for(venue))
    }
}

/// Quantity bounds applied to every opportunity.
#[derive(Debug, Clone, Copy)]
pub struct SizingLimits {
    /// Global cap on tradable quantity.
    pub max_quantity: Decimal,
    /// Floor below which an opportunity is discarded rather than rounded up.
    pub min_quantity: Decimal,
}

/// A sized, fee/slippage-adjusted cross-venue arbitrage candidate.
///
/// `net_profit_per_unit` may be negative at the type level — profitability is
/// a derived predicate, not assumed by construction — but [`score`] only
/// emits profitable opportunities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Listing on the venue we buy from (the cheaper side).
    pub buy: Listing,
    /// Listing on the venue we sell on.
    pub sell: Listing,
    /// Which outcome token the legs trade.
    pub outcome: Outcome,
    /// Raw buy-side price before adjustment.
    pub buy_price: Decimal,
    /// Raw sell-side price before adjustment.
    pub sell_price: Decimal,
    /// Signed raw spread (sell - buy).
    pub spread: Decimal,
    /// Profit per contract after fees and slippage on both legs.
    pub net_profit_per_unit: Decimal,
    /// Profit relative to capital required, in percent.
    pub profit_pct: Decimal,
    /// Match confidence inherited from the pair.
    pub confidence: f64,
    /// Largest tradable quantity (liquidity- and cap-bounded).
    pub max_quantity: Decimal,
    /// Quantity recommended by the position manager, attached after sizing.
    pub recommended_quantity: Option<Decimal>,
    /// When the opportunity was detected.
    pub detected_at: OffsetDateTime,
    /// When the opportunity stops being actionable, if known.
    pub expires_at: Option<OffsetDateTime>,
}

impl Opportunity {
    /// Whether the adjusted edge is positive.
    pub fn is_profitable(&self) -> bool {
        self.net_profit_per_unit > Decimal::ZERO
    }

    /// Implied gain in percent: net profit per unit over buy price.
    pub fn gain_pct(&self) -> Decimal {
        if self.buy_price.is_zero() {
            Decimal::ZERO
        } else {
            self.net_profit_per_unit / self.buy_price * Decimal::ONE_HUNDRED
        }
    }

    /// Capital required to trade `quantity` contracts.
    pub fn required_capital(&self, quantity: Decimal) -> Decimal {
        quantity * self.buy_price
    }

    /// Attach a recommended quantity. The only mutation an opportunity
    /// supports after construction.
    pub fn with_recommended_quantity(mut self, quantity: Decimal) -> Self {
        self.recommended_quantity = Some(quantity);
        self
    }

    /// Short human-readable description for logs and ledger records.
    pub fn describe(&self) -> String {
        format!(
            "{} {} {}@{} -> {}@{} net {}",
            self.outcome,
            self.buy.market_id,
            self.buy.venue,
            self.buy_price,
            self.sell.venue,
            self.sell_price,
            self.net_profit_per_unit,
        )
    }
}

/// Score matched pairs into sized opportunities.
///
/// For each (pair, outcome): the cheaper venue is the buy side; slippage and
/// fees are applied against the taker on both legs; candidates whose adjusted
/// edge is not positive, falls below `min_profit_per_unit`, or whose
/// liquidity-bounded quantity is under the minimum are discarded. Sorted by
/// descending net profit per unit with a deterministic tie-break.
#[instrument(skip_all, fields(pairs = pairs.len()))]
pub fn score(
    pairs: &[MatchedPair],
    fees: &FeeSchedule,
    slippage: &SlippageModel,
    limits: &SizingLimits,
    min_profit_per_unit: Decimal,
) -> Vec<Opportunity> {
    let mut opportunities = Vec::new();

    for pair in pairs {
        for outcome in Outcome::ALL {
            if let Some(opp) = score_pair(pair, outcome, fees, slippage, limits, min_profit_per_unit)
            {
                opportunities.push(opp);
            }
        }
    }

    opportunities.sort_by(|x, y| {
        y.net_profit_per_unit
            .cmp(&x.net_profit_per_unit)
            .then_with(|| x.buy.market_id.cmp(&y.buy.market_id))
            .then_with(|| x.sell.market_id.cmp(&y.sell.market_id))
    });

    debug!(opportunities = opportunities.len(), "scoring pass complete");
    opportunities
}

fn score_pair(
    pair: &MatchedPair,
    outcome: Outcome,
    fees: &FeeSchedule,
    slippage: &SlippageModel,
    limits: &SizingLimits,
    min_profit_per_unit: Decimal,
) -> Option<Opportunity> {
    // Only open listings are tradable.
    if !pair.listing_a.is_open() || !pair.listing_b.is_open() {
        return None;
    }

    let price_a = pair.listing_a.price(outcome);
    let price_b = pair.listing_b.price(outcome);

    // Cheaper venue buys, the other sells.
    let (buy, sell) = if price_a <= price_b {
        (&pair.listing_a, &pair.listing_b)
    } else {
        (&pair.listing_b, &pair.listing_a)
    };
    let buy_price = buy.price(outcome);
    let sell_price = sell.price(outcome);

    let fee_in = Decimal::ONE + fees.fee_for(&buy.venue);
    let fee_out = Decimal::ONE - fees.fee_for(&sell.venue);
    let adjusted_buy = slippage.adjusted_buy(&buy.venue, buy_price) * fee_in;
    let adjusted_sell = slippage.adjusted_sell(&sell.venue, sell_price) * fee_out;

    let net = adjusted_sell - adjusted_buy;
    if net <= Decimal::ZERO || net < min_profit_per_unit {
        return None;
    }

    // Liquidity bound, then the global cap. Never round up past liquidity.
    let quantity = buy
        .liquidity
        .min(sell.liquidity)
        .min(limits.max_quantity);
    if quantity < limits.min_quantity {
        return None;
    }

    let profit_pct = if adjusted_buy.is_zero() {
        Decimal::ZERO
    } else {
        net / adjusted_buy * Decimal::ONE_HUNDRED
    };

    let expires_at = match (buy.close_time, sell.close_time) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    Some(Opportunity {
        buy: buy.clone(),
        sell: sell.clone(),
        outcome,
        buy_price,
        sell_price,
        spread: sell_price - buy_price,
        net_profit_per_unit: net,
        profit_pct,
        confidence: pair.confidence,
        max_quantity: quantity,
        recommended_quantity: None,
        detected_at: OffsetDateTime::now_utc(),
        expires_at,
    })
}
