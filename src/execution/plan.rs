//! Trade plans: dependency-ordered collections of legs.

use std::collections::{BTreeSet, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::scorer::Opportunity;
use crate::venue::{Listing, Outcome, Side};

/// What a leg does within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LegRole {
    /// Opens the position.
    Buy,
    /// Closes or offsets the position.
    Sell,
    /// Offsets risk without closing.
    Hedge,
}

/// Plan lifecycle. Terminal once it leaves `Executing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PlanStatus {
    /// Built but not yet scheduled.
    Pending,
    /// Scheduler is working through the leg graph.
    Executing,
    /// At least one leg executed and the graph resolved.
    Completed,
    /// Zero legs executed, or an unrecoverable scheduling fault.
    Failed,
    /// Cancelled before or between leg batches.
    Cancelled,
}

impl PlanStatus {
    /// Whether the plan can no longer change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PlanStatus::Pending | PlanStatus::Executing)
    }
}

/// Per-leg progress within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LegStatus {
    /// Waiting on dependencies or scheduling.
    Pending,
    /// Fully filled.
    Executed,
    /// Rejected, timed out, or orphaned by a failed dependency.
    Failed,
}

/// Accumulated fill state for one leg. Partial fills fold into a running
/// volume-weighted average price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    /// Total quantity filled so far.
    pub quantity: Decimal,
    /// Volume-weighted average fill price.
    pub average_price: Decimal,
}

impl LegFill {
    /// Start from the first fill.
    pub fn new(quantity: Decimal, price: Decimal) -> Self {
        Self {
            quantity,
            average_price: price,
        }
    }

    /// Fold another partial fill into the running average.
    pub fn accumulate(&mut self, quantity: Decimal, price: Decimal) {
        let total = self.quantity + quantity;
        if total.is_zero() {
            return;
        }
        self.average_price =
            (self.average_price * self.quantity + price * quantity) / total;
        self.quantity = total;
    }

    /// Notional value of the accumulated fills.
    pub fn notional(&self) -> Decimal {
        self.quantity * self.average_price
    }
}

/// One order within a trade plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    /// Plan-unique leg id.
    pub id: String,
    /// Role within the plan.
    pub role: LegRole,
    /// Target listing snapshot.
    pub listing: Listing,
    /// Outcome token traded.
    pub outcome: Outcome,
    /// Order side.
    pub side: Side,
    /// Target quantity.
    pub quantity: Decimal,
    /// Target (limit) price.
    pub price: Decimal,
    /// Lower executes first within a batch.
    pub priority: u32,
    /// Leg ids that must be executed before this one.
    pub depends_on: BTreeSet<String>,
    /// Scheduling status.
    pub status: LegStatus,
    /// Accumulated fill, present once anything has filled.
    pub fill: Option<LegFill>,
    /// Why the leg failed, when it did.
    pub failure_reason: Option<String>,
}

impl Leg {
    /// New pending leg with no dependencies.
    pub fn new(
        id: impl Into<String>,
        role: LegRole,
        listing: Listing,
        outcome: Outcome,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            listing,
            outcome,
            side,
            quantity,
            price,
            priority: 0,
            depends_on: BTreeSet::new(),
            status: LegStatus::Pending,
            fill: None,
            failure_reason: None,
        }
    }

    /// Set the batch priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Declare a dependency on another leg.
    pub fn depends_on(mut self, leg_id: impl Into<String>) -> Self {
        self.depends_on.insert(leg_id.into());
        self
    }

    /// Fold a partial fill into the leg.
    pub fn record_fill(&mut self, quantity: Decimal, price: Decimal) {
        match &mut self.fill {
            Some(fill) => fill.accumulate(quantity, price),
            None => self.fill = Some(LegFill::new(quantity, price)),
        }
    }

    /// Quantity still unfilled.
    pub fn remaining(&self) -> Decimal {
        let filled = self.fill.map(|f| f.quantity).unwrap_or(Decimal::ZERO);
        (self.quantity - filled).max(Decimal::ZERO)
    }

    /// Whether the target quantity has been reached.
    pub fn is_fully_filled(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// A named collection of legs with aggregate expected-return metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    /// Unique plan id.
    pub id: Uuid,
    /// Human-readable plan name.
    pub name: String,
    /// Expected total profit for the plan.
    pub expected_profit: Decimal,
    /// The legs, in construction order.
    pub legs: Vec<Leg>,
    /// Plan lifecycle status.
    pub status: PlanStatus,
    /// When the plan was built.
    pub created_at: OffsetDateTime,
}

impl TradePlan {
    /// Build and validate a plan. Rejects empty plans, duplicate leg ids,
    /// and dependencies on legs that are not part of the plan.
    pub fn new(
        name: impl Into<String>,
        expected_profit: Decimal,
        legs: Vec<Leg>,
    ) -> Result<Self, ExecutionError> {
        let id = Uuid::new_v4();
        if legs.is_empty() {
            return Err(ExecutionError::EmptyPlan { plan_id: id });
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for leg in &legs {
            if !seen.insert(leg.id.as_str()) {
                return Err(ExecutionError::DuplicateLegId {
                    plan_id: id,
                    leg_id: leg.id.clone(),
                });
            }
        }
        for leg in &legs {
            for dep in &leg.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(ExecutionError::UnknownDependency {
                        plan_id: id,
                        leg_id: leg.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(Self {
            id,
            name: name.into(),
            expected_profit,
            legs,
            status: PlanStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Synthesize the standard two-leg arbitrage plan from a sized
    /// opportunity: a buy leg with no dependencies and a sell leg that
    /// depends on it, so the sell side can never run before the buy side
    /// is confirmed.
    pub fn for_opportunity(
        opportunity: &Opportunity,
        quantity: Decimal,
    ) -> Result<Self, ExecutionError> {
        let buy = Leg::new(
            "buy",
            LegRole::Buy,
            opportunity.buy.clone(),
            opportunity.outcome,
            Side::Buy,
            quantity,
            opportunity.buy_price,
        )
        .with_priority(0);
        let sell = Leg::new(
            "sell",
            LegRole::Sell,
            opportunity.sell.clone(),
            opportunity.outcome,
            Side::Sell,
            quantity,
            opportunity.sell_price,
        )
        .with_priority(1)
        .depends_on("buy");

        let name = format!(
            "arb {}:{} -> {}:{}",
            opportunity.buy.venue,
            opportunity.buy.market_id,
            opportunity.sell.venue,
            opportunity.sell.market_id,
        );
        Self::new(name, opportunity.net_profit_per_unit * quantity, vec![buy, sell])
    }

    /// Look up a leg by id.
    pub fn leg(&self, id: &str) -> Option<&Leg> {
        self.legs.iter().find(|l| l.id == id)
    }

    /// Whether the plan can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::ListingBuilder;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn listing(venue: &str, market: &str) -> Listing {
        ListingBuilder::new(venue, market, "Fed cuts rates")
            .prices(dec!(0.40), dec!(0.55))
            .liquidity(dec!(1000))
            .build()
    }

    fn leg(id: &str) -> Leg {
        Leg::new(
            id,
            LegRole::Buy,
            listing("alpha", "m1"),
            Outcome::Yes,
            Side::Buy,
            dec!(100),
            dec!(0.40),
        )
    }

    #[test]
    fn empty_plan_is_rejected() {
        let err = TradePlan::new("empty", Decimal::ZERO, vec![]).unwrap_err();
        assert!(matches!(err, ExecutionError::EmptyPlan { .. }));
    }

    #[test]
    fn duplicate_leg_ids_are_rejected() {
        let err = TradePlan::new("dup", Decimal::ZERO, vec![leg("a"), leg("a")]).unwrap_err();
        assert!(matches!(err, ExecutionError::DuplicateLegId { .. }));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = TradePlan::new(
            "bad-dep",
            Decimal::ZERO,
            vec![leg("a"), leg("b").depends_on("missing")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::UnknownDependency { ref dependency, .. } if dependency == "missing"
        ));
    }

    #[test]
    fn vwap_accumulates_partial_fills() {
        let mut l = leg("a");
        l.record_fill(dec!(60), dec!(0.40));
        l.record_fill(dec!(40), dec!(0.45));

        let fill = l.fill.unwrap();
        assert_eq!(fill.quantity, dec!(100));
        // (60 * 0.40 + 40 * 0.45) / 100 = 0.42
        assert_eq!(fill.average_price, dec!(0.42));
        assert!(l.is_fully_filled());
    }

    #[test]
    fn remaining_tracks_partial_progress() {
        let mut l = leg("a");
        assert_eq!(l.remaining(), dec!(100));
        l.record_fill(dec!(30), dec!(0.40));
        assert_eq!(l.remaining(), dec!(70));
        assert!(!l.is_fully_filled());
    }

    #[test]
    fn opportunity_plan_orders_sell_after_buy() {
        let opp = Opportunity {
            buy: listing("alpha", "a1"),
            sell: listing("beta", "b1"),
            outcome: Outcome::Yes,
            buy_price: dec!(0.40),
            sell_price: dec!(0.55),
            spread: dec!(0.15),
            net_profit_per_unit: dec!(0.12),
            profit_pct: dec!(30),
            confidence: 0.9,
            max_quantity: dec!(500),
            recommended_quantity: None,
            detected_at: OffsetDateTime::now_utc(),
            expires_at: None,
        };

        let plan = TradePlan::for_opportunity(&opp, dec!(200)).unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.expected_profit, dec!(24));

        let buy = plan.leg("buy").unwrap();
        let sell = plan.leg("sell").unwrap();
        assert!(buy.depends_on.is_empty());
        assert!(sell.depends_on.contains("buy"));
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(sell.side, Side::Sell);
        assert!(buy.priority < sell.priority);
    }
}
