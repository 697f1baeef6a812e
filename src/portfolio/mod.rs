//! Position tracking and the capacity-bounded position manager.
//!
//! The position manager owns the active position set exclusively. All
//! admission, eviction, sizing, and mark-price mutation goes through its
//! methods so capacity checks and balances stay consistent as a group.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PortfolioError;
use crate::scorer::Opportunity;
use crate::venue::{Listing, Outcome, VenueId};

/// Settlement ceiling for a binary contract.
pub const BINARY_MAX_PRICE: Decimal = Decimal::ONE;

/// An open position on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position id.
    pub id: Uuid,
    /// Venue holding the position.
    pub venue: VenueId,
    /// Venue-native market id.
    pub market_id: String,
    /// Outcome token held.
    pub outcome: Outcome,
    /// Signed quantity; positive is long. Never zero while active.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Latest mark price.
    pub current_price: Decimal,
    /// Total cost basis (entry price x quantity at creation).
    pub cost_basis: Decimal,
    /// Optional target exit price.
    pub target_price: Option<Decimal>,
    /// Maximum potential price (1.0 for a binary contract).
    pub max_price: Decimal,
    /// When the position was opened.
    pub opened_at: OffsetDateTime,
    /// Trade plan that created this position, when known.
    pub plan_id: Option<Uuid>,
}

impl Position {
    /// Open a new long position.
    pub fn open(
        venue: VenueId,
        market_id: impl Into<String>,
        outcome: Outcome,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            venue,
            market_id: market_id.into(),
            outcome,
            quantity,
            entry_price,
            current_price: entry_price,
            cost_basis: entry_price * quantity,
            target_price: None,
            max_price: BINARY_MAX_PRICE,
            opened_at: OffsetDateTime::now_utc(),
            plan_id: None,
        }
    }

    /// Set the target exit price.
    pub fn with_target(mut self, target: Decimal) -> Self {
        self.target_price = Some(target);
        self
    }

    /// Attach the originating plan id.
    pub fn with_plan(mut self, plan_id: Uuid) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    /// Value at the current mark.
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }

    /// Unrealized P&L at the current mark.
    pub fn unrealized_pnl(&self) -> Decimal {
        self.market_value() - self.cost_basis
    }

    /// Unrealized P&L relative to the cost basis, in percent.
    pub fn unrealized_pnl_pct(&self) -> Decimal {
        if self.cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl() / self.cost_basis.abs() * Decimal::ONE_HUNDRED
        }
    }

    /// How long the position has been open.
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        let seconds = (now - self.opened_at).whole_seconds().max(0);
        Duration::from_secs(seconds as u64)
    }

    /// The exit price eviction ranking works against: the target when set,
    /// otherwise the settlement ceiling.
    pub fn target_or_max(&self) -> Decimal {
        self.target_price.unwrap_or(self.max_price)
    }
}

/// Why a position left the active set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Target reached or operator close.
    Closed,
    /// Evicted in favor of a materially better opportunity.
    Swapped,
    /// Stop-loss breached.
    StopLoss,
    /// Held past the maximum duration.
    MaxHold,
    /// Execution of the opening plan failed after admission.
    ExecutionFailed,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Closed => f.write_str("closed"),
            ExitReason::Swapped => f.write_str("swapped"),
            ExitReason::StopLoss => f.write_str("stop-loss"),
            ExitReason::MaxHold => f.write_str("max-hold"),
            ExitReason::ExecutionFailed => f.write_str("execution-failed"),
        }
    }
}

/// A position after eviction, kept in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    /// The position as it was at close.
    pub position: Position,
    /// Why it was closed.
    pub reason: ExitReason,
    /// When it was closed.
    pub closed_at: OffsetDateTime,
    /// P&L realized at the closing mark.
    pub realized_pnl: Decimal,
}

/// Position-manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct PositionManagerConfig {
    /// Maximum concurrent open positions.
    pub max_open_positions: usize,
    /// Minimum improvement (percentage points) a new opportunity must show
    /// over the worst open position before a swap happens.
    pub min_swap_improvement_pct: Decimal,
    /// Fraction of portfolio value to allocate per position.
    pub position_size_fraction: Decimal,
    /// Minimum acceptable remaining gain before a position is considered
    /// fully played out.
    pub min_remaining_gain_pct: Decimal,
    /// Stop-loss threshold in percent (positive number, e.g. 20 = -20% P&L).
    pub stop_loss_pct: Decimal,
    /// Maximum time to hold a position.
    pub max_hold: Duration,
}

impl Default for PositionManagerConfig {
    fn default() -> Self {
        Self {
            max_open_positions: 5,
            min_swap_improvement_pct: Decimal::new(5, 0),
            position_size_fraction: Decimal::new(1, 1), // 0.1
            min_remaining_gain_pct: Decimal::new(2, 0),
            stop_loss_pct: Decimal::new(20, 0),
            max_hold: Duration::from_secs(24 * 3600),
        }
    }
}

/// Decision returned by [`PositionManager::should_swap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapDecision {
    /// Position to evict.
    pub evict: Uuid,
}

/// Owns the active position set and decides admission and eviction.
#[derive(Debug)]
pub struct PositionManager {
    config: PositionManagerConfig,
    active: HashMap<Uuid, Position>,
    closed: Vec<ClosedPosition>,
}

impl PositionManager {
    /// New empty manager.
    pub fn new(config: PositionManagerConfig) -> Self {
        Self {
            config,
            active: HashMap::new(),
            closed: Vec::new(),
        }
    }

    /// Whether a new position can be admitted without eviction.
    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.config.max_open_positions
    }

    /// Number of active positions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active positions, unordered.
    pub fn active_positions(&self) -> impl Iterator<Item = &Position> {
        self.active.values()
    }

    /// Closed-position history, oldest first.
    pub fn closed_positions(&self) -> &[ClosedPosition] {
        &self.closed
    }

    /// Look up an active position.
    pub fn get(&self, id: Uuid) -> Option<&Position> {
        self.active.get(&id)
    }

    /// Combined market value of the active set.
    pub fn total_market_value(&self) -> Decimal {
        self.active.values().map(Position::market_value).sum()
    }

    /// Upside still available in a position, in percent of the current mark:
    /// how far the mark can run to the target (or the settlement ceiling)
    /// from here. The single ranking metric for eviction decisions.
    pub fn remaining_gain_pct(&self, position: &Position) -> Decimal {
        if position.current_price <= Decimal::ZERO {
            // A zero mark has no observable upside to rank on.
            return Decimal::ZERO;
        }
        (position.target_or_max() - position.current_price) / position.current_price
            * Decimal::ONE_HUNDRED
    }

    /// The active position with the least remaining upside.
    pub fn worst(&self) -> Option<&Position> {
        self.active.values().min_by(|a, b| {
            self.remaining_gain_pct(a)
                .cmp(&self.remaining_gain_pct(b))
                .then_with(|| a.id.cmp(&b.id))
        })
    }

    /// Decide whether a new opportunity should displace the worst position.
    ///
    /// Never swaps while capacity remains, and only swaps when the
    /// improvement meets the configured threshold — marginally better
    /// opportunities must not churn the book.
    pub fn should_swap(&self, opportunity: &Opportunity) -> Option<SwapDecision> {
        if self.has_capacity() {
            return None;
        }
        let worst = self.worst()?;
        let improvement = opportunity.gain_pct() - self.remaining_gain_pct(worst);
        if improvement >= self.config.min_swap_improvement_pct {
            Some(SwapDecision { evict: worst.id })
        } else {
            None
        }
    }

    /// Size a position for an opportunity against the portfolio value.
    ///
    /// Target notional is a configured fraction of portfolio value; the
    /// resulting quantity is clamped to [1, opportunity max].
    pub fn size_position(&self, opportunity: &Opportunity, portfolio_value: Decimal) -> Decimal {
        if opportunity.buy_price.is_zero() {
            return Decimal::ZERO;
        }
        let notional = portfolio_value * self.config.position_size_fraction;
        let ceiling = opportunity.max_quantity.max(Decimal::ONE);
        (notional / opportunity.buy_price)
            .floor()
            .clamp(Decimal::ONE, ceiling)
    }

    /// Positions that must be closed immediately: stop-loss breached or held
    /// past the maximum duration. Runs before any admission decision in every
    /// cycle and is never skipped.
    pub fn check_forced_exits(&self, now: OffsetDateTime) -> Vec<(Uuid, ExitReason)> {
        let mut exits: Vec<(Uuid, ExitReason)> = self
            .active
            .values()
            .filter_map(|position| {
                if position.unrealized_pnl_pct() <= -self.config.stop_loss_pct {
                    Some((position.id, ExitReason::StopLoss))
                } else if position.age(now) >= self.config.max_hold {
                    Some((position.id, ExitReason::MaxHold))
                } else {
                    None
                }
            })
            .collect();
        exits.sort_by_key(|(id, _)| *id);
        exits
    }

    /// Admit a position into the active set.
    pub fn admit(&mut self, position: Position) -> Result<(), PortfolioError> {
        if position.quantity.is_zero() {
            return Err(PortfolioError::ZeroQuantity {
                position_id: position.id,
            });
        }
        if !self.has_capacity() {
            return Err(PortfolioError::CapacityExceeded {
                active: self.active.len(),
                max: self.config.max_open_positions,
            });
        }
        info!(
            position_id = %position.id,
            venue = %position.venue,
            market_id = %position.market_id,
            quantity = %position.quantity,
            entry_price = %position.entry_price,
            "position admitted"
        );
        self.active.insert(position.id, position);
        Ok(())
    }

    /// Remove a position from the active set into closed history.
    ///
    /// The only operation permitted to destroy a position.
    pub fn evict(&mut self, id: Uuid, reason: ExitReason) -> Result<Position, PortfolioError> {
        let position = self
            .active
            .remove(&id)
            .ok_or(PortfolioError::UnknownPosition { position_id: id })?;
        let realized_pnl = position.unrealized_pnl();
        info!(
            position_id = %id,
            %reason,
            realized_pnl = %realized_pnl,
            "position evicted"
        );
        self.closed.push(ClosedPosition {
            position: position.clone(),
            reason,
            closed_at: OffsetDateTime::now_utc(),
            realized_pnl,
        });
        Ok(position)
    }

    /// Reconcile a reserved position with the actual execution fill. Entry
    /// price, quantity, and cost basis are replaced as a group.
    pub fn reconcile_entry(
        &mut self,
        id: Uuid,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Result<(), PortfolioError> {
        if quantity.is_zero() {
            return Err(PortfolioError::ZeroQuantity { position_id: id });
        }
        let position = self
            .active
            .get_mut(&id)
            .ok_or(PortfolioError::UnknownPosition { position_id: id })?;
        position.quantity = quantity;
        position.entry_price = entry_price;
        position.current_price = entry_price;
        position.cost_basis = entry_price * quantity;
        Ok(())
    }

    /// Refresh mark prices from fresh listing snapshots. Positions without a
    /// matching snapshot keep their previous mark.
    pub fn refresh_marks(&mut self, listings: &[Listing]) {
        for position in self.active.values_mut() {
            if let Some(listing) = listings
                .iter()
                .find(|l| l.venue == position.venue && l.market_id == position.market_id)
            {
                position.current_price = listing.price(position.outcome);
            }
        }
    }
}

/// Per-venue cash balances. The only mutable shared state besides the active
/// position set; all mutation goes through these methods.
#[derive(Debug, Default, Clone)]
pub struct PortfolioTracker {
    cash: HashMap<VenueId, Decimal>,
}

impl PortfolioTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cash balance for a venue.
    pub fn set_cash(&mut self, venue: VenueId, amount: Decimal) {
        self.cash.insert(venue, amount);
    }

    /// Cash available on one venue.
    pub fn cash(&self, venue: &VenueId) -> Decimal {
        self.cash.get(venue).copied().unwrap_or(Decimal::ZERO)
    }

    /// Credit cash to a venue.
    pub fn credit(&mut self, venue: &VenueId, amount: Decimal) {
        *self.cash.entry(venue.clone()).or_insert(Decimal::ZERO) += amount;
    }

    /// Debit cash from a venue. Balances may not go negative.
    pub fn debit(&mut self, venue: &VenueId, amount: Decimal) -> Result<(), PortfolioError> {
        let balance = self.cash.entry(venue.clone()).or_insert(Decimal::ZERO);
        if *balance < amount {
            warn!(venue = %venue, have = %balance, need = %amount, "debit refused");
            return Err(PortfolioError::InvalidSize { quantity: amount });
        }
        *balance -= amount;
        Ok(())
    }

    /// Cash across all venues.
    pub fn total_cash(&self) -> Decimal {
        self.cash.values().copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::ListingBuilder;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn config(max: usize) -> PositionManagerConfig {
        PositionManagerConfig {
            max_open_positions: max,
            min_swap_improvement_pct: dec!(5),
            position_size_fraction: dec!(0.1),
            min_remaining_gain_pct: dec!(2),
            stop_loss_pct: dec!(20),
            max_hold: Duration::from_secs(3600),
        }
    }

    fn position(entry: Decimal, current: Decimal, target: Option<Decimal>) -> Position {
        let mut p = Position::open(
            VenueId::new("alpha"),
            "mkt-1",
            Outcome::Yes,
            dec!(100),
            entry,
        );
        p.current_price = current;
        p.target_price = target;
        p
    }

    fn opportunity(buy_price: Decimal, net: Decimal) -> Opportunity {
        Opportunity {
            buy: ListingBuilder::new("alpha", "a1", "Fed cuts").build(),
            sell: ListingBuilder::new("beta", "b1", "Fed cuts").build(),
            outcome: Outcome::Yes,
            buy_price,
            sell_price: buy_price + net,
            spread: net,
            net_profit_per_unit: net,
            profit_pct: Decimal::ZERO,
            confidence: 0.9,
            max_quantity: dec!(500),
            recommended_quantity: None,
            detected_at: OffsetDateTime::now_utc(),
            expires_at: None,
        }
    }

    #[test]
    fn capacity_tracking() {
        let mut pm = PositionManager::new(config(2));
        assert!(pm.has_capacity());

        pm.admit(position(dec!(0.5), dec!(0.5), None)).unwrap();
        assert!(pm.has_capacity());
        pm.admit(position(dec!(0.5), dec!(0.5), None)).unwrap();
        assert!(!pm.has_capacity());

        let overflow = pm.admit(position(dec!(0.5), dec!(0.5), None));
        assert!(matches!(
            overflow,
            Err(PortfolioError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn admit_rejects_zero_quantity() {
        let mut pm = PositionManager::new(config(2));
        let mut p = position(dec!(0.5), dec!(0.5), None);
        p.quantity = Decimal::ZERO;
        assert!(matches!(pm.admit(p), Err(PortfolioError::ZeroQuantity { .. })));
    }

    #[test]
    fn remaining_gain_uses_target_then_ceiling() {
        let pm = PositionManager::new(config(2));

        // Target set: (0.515 - 0.50) / 0.50 = 3%.
        let with_target = position(dec!(0.50), dec!(0.50), Some(dec!(0.515)));
        assert_eq!(pm.remaining_gain_pct(&with_target), dec!(3));

        // No target: ceiling 1.0 -> (1.0 - 0.50) / 0.50 = 100%.
        let without = position(dec!(0.50), dec!(0.50), None);
        assert_eq!(pm.remaining_gain_pct(&without), dec!(100));
    }

    #[test]
    fn worst_picks_lowest_remaining_gain() {
        let mut pm = PositionManager::new(config(3));
        let low = position(dec!(0.50), dec!(0.50), Some(dec!(0.515))); // 3%
        let low_id = low.id;
        pm.admit(low).unwrap();
        pm.admit(position(dec!(0.50), dec!(0.50), Some(dec!(0.52)))).unwrap(); // 4%

        assert_eq!(pm.worst().unwrap().id, low_id);
    }

    #[test]
    fn never_swaps_while_capacity_remains() {
        let mut pm = PositionManager::new(config(2));
        pm.admit(position(dec!(0.50), dec!(0.50), Some(dec!(0.515)))).unwrap();

        // Enormous edge, but a slot is free.
        let opp = opportunity(dec!(0.40), dec!(0.20));
        assert!(pm.should_swap(&opp).is_none());
    }

    #[test]
    fn swap_scenario_targets_weakest_position() {
        // At max 2 positions holding 3% and 4% remaining gain; new
        // opportunity with 9% implied gain and a 5 point threshold.
        let mut pm = PositionManager::new(config(2));
        let weak = position(dec!(0.50), dec!(0.50), Some(dec!(0.515))); // 3%
        let weak_id = weak.id;
        pm.admit(weak).unwrap();
        pm.admit(position(dec!(0.50), dec!(0.50), Some(dec!(0.52)))).unwrap(); // 4%

        // 0.036 / 0.40 = 9%.
        let opp = opportunity(dec!(0.40), dec!(0.036));
        let decision = pm.should_swap(&opp).expect("swap expected");
        assert_eq!(decision.evict, weak_id);
    }

    #[test]
    fn marginal_improvement_does_not_churn() {
        let mut pm = PositionManager::new(config(1));
        pm.admit(position(dec!(0.50), dec!(0.50), Some(dec!(0.515)))).unwrap(); // 3%

        // 7% gain: improvement 4 points, below the 5 point threshold.
        let opp = opportunity(dec!(0.40), dec!(0.028));
        assert!(pm.should_swap(&opp).is_none());
    }

    #[test]
    fn swap_threshold_boundary_is_inclusive() {
        let mut pm = PositionManager::new(config(1));
        pm.admit(position(dec!(0.50), dec!(0.50), Some(dec!(0.515)))).unwrap(); // 3%

        // Exactly 8% gain: improvement exactly 5 points.
        let opp = opportunity(dec!(0.40), dec!(0.032));
        assert!(pm.should_swap(&opp).is_some());
    }

    #[test]
    fn sizing_clamps_to_opportunity_maximum() {
        let pm = PositionManager::new(config(2));
        let opp = opportunity(dec!(0.40), dec!(0.15));

        // 10% of 10_000 = 1000 notional -> 2500 contracts, clamped to 500.
        assert_eq!(pm.size_position(&opp, dec!(10000)), dec!(500));
        // 10% of 100 = 10 notional -> 25 contracts, within bounds.
        assert_eq!(pm.size_position(&opp, dec!(100)), dec!(25));
        // Tiny portfolio still sizes at least one contract.
        assert_eq!(pm.size_position(&opp, dec!(1)), dec!(1));
    }

    #[test]
    fn forced_exit_on_stop_loss() {
        let mut pm = PositionManager::new(config(2));
        // Entry 0.50, marked down to 0.35: -30% against a 20% stop.
        let losing = position(dec!(0.50), dec!(0.35), None);
        let losing_id = losing.id;
        pm.admit(losing).unwrap();
        pm.admit(position(dec!(0.50), dec!(0.50), None)).unwrap();

        let exits = pm.check_forced_exits(OffsetDateTime::now_utc());
        assert_eq!(exits, vec![(losing_id, ExitReason::StopLoss)]);
    }

    #[test]
    fn forced_exit_on_max_hold() {
        let mut pm = PositionManager::new(config(2));
        let mut stale = position(dec!(0.50), dec!(0.50), None);
        stale.opened_at = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let stale_id = stale.id;
        pm.admit(stale).unwrap();

        let exits = pm.check_forced_exits(OffsetDateTime::now_utc());
        assert_eq!(exits, vec![(stale_id, ExitReason::MaxHold)]);
    }

    #[test]
    fn evict_moves_position_to_history() {
        let mut pm = PositionManager::new(config(2));
        let p = position(dec!(0.50), dec!(0.60), None);
        let id = p.id;
        pm.admit(p).unwrap();

        let evicted = pm.evict(id, ExitReason::Closed).unwrap();
        assert_eq!(evicted.id, id);
        assert_eq!(pm.active_count(), 0);
        assert_eq!(pm.closed_positions().len(), 1);
        // (0.60 - 0.50) * 100 = 10 realized.
        assert_eq!(pm.closed_positions()[0].realized_pnl, dec!(10));

        assert!(matches!(
            pm.evict(id, ExitReason::Closed),
            Err(PortfolioError::UnknownPosition { .. })
        ));
    }

    #[test]
    fn refresh_marks_updates_matching_positions() {
        let mut pm = PositionManager::new(config(2));
        let p = position(dec!(0.50), dec!(0.50), None);
        let id = p.id;
        pm.admit(p).unwrap();

        let fresh = vec![ListingBuilder::new("alpha", "mkt-1", "Fed cuts")
            .prices(dec!(0.62), dec!(0.40))
            .build()];
        pm.refresh_marks(&fresh);

        assert_eq!(pm.get(id).unwrap().current_price, dec!(0.62));
    }

    #[test]
    fn tracker_balance_mutation() {
        let mut tracker = PortfolioTracker::new();
        let alpha = VenueId::new("alpha");
        tracker.set_cash(alpha.clone(), dec!(100));

        tracker.debit(&alpha, dec!(30)).unwrap();
        tracker.credit(&alpha, dec!(5));
        assert_eq!(tracker.cash(&alpha), dec!(75));

        assert!(tracker.debit(&alpha, dec!(1000)).is_err());
        assert_eq!(tracker.total_cash(), dec!(75));
    }
}
