//! Decision-cycle orchestration.
//!
//! One cycle: refresh marks and run forced exits, poll every venue for
//! listing snapshots, match cross-venue pairs, score them into
//! opportunities, validate, admit (with capacity/swap decisions under a
//! single lock), execute, and reconcile fills back into the book. A venue
//! that fails to answer costs the cycle its listings, never the cycle
//! itself.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::execution::{CancelHandle, ExecutionConfig, ExecutionEngine};
use crate::ledger::{Ledger, LedgerRecord};
use crate::matcher;
use crate::metrics;
use crate::portfolio::{
    ExitReason, PortfolioTracker, Position, PositionManager, PositionManagerConfig,
};
use crate::scorer::{self, FeeSchedule, Opportunity, SizingLimits, SlippageModel};
use crate::validator::{self, ValidationContext};
use crate::venue::{Listing, OrderRequest, Side, VenueRegistry};

/// Counters for one decision cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Venues that answered the listing poll.
    pub venues_polled: usize,
    /// Listing snapshots fetched across venues.
    pub listings_fetched: usize,
    /// Cross-venue pairs above the match threshold.
    pub pairs_matched: usize,
    /// Opportunities produced by the scorer.
    pub opportunities_scored: usize,
    /// Opportunities turned away by validation or admission.
    pub opportunities_rejected: usize,
    /// Opportunities sent to execution.
    pub opportunities_executed: usize,
    /// Positions opened this cycle.
    pub positions_opened: usize,
    /// Stop-loss or max-hold closures this cycle.
    pub forced_exits: usize,
}

/// The book: active positions plus per-venue cash. One lock guards both so
/// the capacity check-then-admit sequence is a critical section.
struct Book {
    manager: PositionManager,
    tracker: PortfolioTracker,
}

enum Admission {
    Admitted {
        position_id: Uuid,
        quantity: Decimal,
        displaced: Option<Position>,
    },
    Refused(String),
}

/// Drives the polling loop and wires the pipeline stages together.
pub struct Coordinator {
    config: Config,
    venues: VenueRegistry,
    engine: ExecutionEngine,
    fees: FeeSchedule,
    slippage: SlippageModel,
    limits: SizingLimits,
    book: Mutex<Book>,
    ledger: Arc<dyn Ledger>,
    cancel: CancelHandle,
}

impl Coordinator {
    /// Wire a coordinator over a fixed venue registry and ledger.
    pub fn new(config: Config, venues: VenueRegistry, ledger: Arc<dyn Ledger>) -> Self {
        let engine = ExecutionEngine::new(
            venues.clone(),
            ExecutionConfig {
                order_timeout: config.order_timeout(),
                max_fill_attempts: config.max_fill_attempts,
            },
        );
        let manager = PositionManager::new(PositionManagerConfig {
            max_open_positions: config.max_open_positions,
            min_swap_improvement_pct: config.min_swap_improvement_pct,
            position_size_fraction: config.position_size_fraction,
            min_remaining_gain_pct: config.min_remaining_gain_pct,
            stop_loss_pct: config.stop_loss_pct,
            max_hold: config.max_hold(),
        });
        Self {
            fees: FeeSchedule::flat(config.fee_pct),
            slippage: SlippageModel::flat(config.slippage_pct),
            limits: SizingLimits {
                max_quantity: config.max_position_size,
                min_quantity: config.min_position_size,
            },
            engine,
            venues,
            book: Mutex::new(Book {
                manager,
                tracker: PortfolioTracker::new(),
            }),
            ledger,
            cancel: CancelHandle::new(),
            config,
        }
    }

    /// Handle for stopping the loop and in-flight plans between batches.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Seed per-venue cash from venue balances. A venue that fails the
    /// balance query starts with the configured paper cash instead.
    pub async fn seed_balances(&self) {
        let mut book = self.book.lock().await;
        for venue in self.venues.venues() {
            let client = match self.venues.get(&venue) {
                Some(client) => client,
                None => continue,
            };
            let cash = match client.get_balance().await {
                Ok(balance) => balance.available,
                Err(err) => {
                    warn!(venue = %venue, %err, "balance query failed, using paper cash");
                    self.config.paper_cash
                }
            };
            info!(venue = %venue, %cash, "seeded venue balance");
            book.tracker.set_cash(venue, cash);
        }
    }

    /// Cash plus marked position value.
    pub async fn portfolio_value(&self) -> Decimal {
        let book = self.book.lock().await;
        book.tracker.total_cash() + book.manager.total_market_value()
    }

    /// Run decision cycles at the configured interval until cancelled.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        info!(
            interval_secs = self.config.poll_interval_secs,
            venues = self.venues.len(),
            "coordinator started"
        );
        loop {
            ticker.tick().await;
            if self.cancel.is_cancelled() {
                info!("coordinator stopping");
                return Ok(());
            }
            match self.run_cycle().await {
                Ok(stats) => debug!(?stats, "cycle finished"),
                Err(err) => error!(%err, "cycle failed"),
            }
        }
    }

    /// One decision cycle.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let started = Instant::now();
        let mut stats = CycleStats::default();

        let snapshots = self.fetch_all_listings(&mut stats).await;
        let all_listings: Vec<Listing> = snapshots.iter().flat_map(|(_, l)| l.clone()).collect();

        self.handle_forced_exits(&all_listings, &mut stats).await?;

        let mut opportunities: Vec<Opportunity> = Vec::new();
        for i in 0..snapshots.len() {
            for j in (i + 1)..snapshots.len() {
                let pairs = matcher::find_matches(
                    &snapshots[i].1,
                    &snapshots[j].1,
                    self.config.min_match_confidence,
                );
                stats.pairs_matched += pairs.len();
                metrics::inc_pairs_matched(pairs.len() as u64);
                opportunities.extend(scorer::score(
                    &pairs,
                    &self.fees,
                    &self.slippage,
                    &self.limits,
                    self.config.min_profit_per_unit,
                ));
            }
        }
        // Merge pairwise results back into one best-first queue.
        opportunities.sort_by(|a, b| {
            b.net_profit_per_unit
                .cmp(&a.net_profit_per_unit)
                .then_with(|| a.buy.market_id.cmp(&b.buy.market_id))
        });
        stats.opportunities_scored = opportunities.len();
        metrics::inc_opportunities_detected(opportunities.len() as u64);

        for opportunity in opportunities {
            if self.cancel.is_cancelled() {
                break;
            }
            self.process_opportunity(opportunity, &mut stats).await?;
        }

        metrics::record_cycle_latency(started);
        info!(
            venues = stats.venues_polled,
            listings = stats.listings_fetched,
            pairs = stats.pairs_matched,
            scored = stats.opportunities_scored,
            rejected = stats.opportunities_rejected,
            executed = stats.opportunities_executed,
            forced_exits = stats.forced_exits,
            "decision cycle complete"
        );
        Ok(stats)
    }

    /// Poll every venue for fresh listings. Failures are logged and cost the
    /// cycle that venue's listings only.
    async fn fetch_all_listings(&self, stats: &mut CycleStats) -> Vec<(String, Vec<Listing>)> {
        let mut snapshots = Vec::new();
        for venue in self.venues.venues() {
            let client = match self.venues.get(&venue) {
                Some(client) => client,
                None => continue,
            };
            let started = Instant::now();
            match client.get_listings(self.config.min_volume).await {
                Ok(listings) => {
                    metrics::record_listing_fetch_latency(started, &venue.0);
                    debug!(venue = %venue, count = listings.len(), "fetched listings");
                    stats.venues_polled += 1;
                    stats.listings_fetched += listings.len();
                    snapshots.push((venue.0.clone(), listings));
                }
                Err(err) => {
                    warn!(venue = %venue, %err, "listing fetch failed, skipping venue this cycle");
                }
            }
        }
        snapshots
    }

    /// Refresh marks and close out stop-loss / max-hold positions. Runs
    /// before any admission decision, every cycle.
    async fn handle_forced_exits(
        &self,
        fresh_listings: &[Listing],
        stats: &mut CycleStats,
    ) -> Result<()> {
        let closed: Vec<(Position, ExitReason)> = {
            let mut book = self.book.lock().await;
            book.manager.refresh_marks(fresh_listings);
            let exits = book.manager.check_forced_exits(OffsetDateTime::now_utc());
            let mut closed = Vec::with_capacity(exits.len());
            for (id, reason) in exits {
                let position = book.manager.evict(id, reason.clone())?;
                closed.push((position, reason));
            }
            closed
        };

        for (position, reason) in closed {
            stats.forced_exits += 1;
            metrics::inc_forced_exits(&reason.to_string());
            metrics::inc_positions_closed();
            let proceeds = self.close_out(&position).await;
            if let Some(proceeds) = proceeds {
                let mut book = self.book.lock().await;
                book.tracker.credit(&position.venue, proceeds);
            }
            let pnl = position.unrealized_pnl();
            warn!(
                position_id = %position.id,
                %reason,
                pnl = %pnl,
                "forced exit"
            );
            self.ledger
                .save(LedgerRecord::position(
                    position.id,
                    format!(
                        "forced exit ({}) of {} on {}",
                        reason, position.market_id, position.venue
                    ),
                    Some(pnl),
                ))
                .await?;
        }
        Ok(())
    }

    /// Place the closing sell for an evicted position. Returns the proceeds,
    /// or `None` when the close could not be filled.
    async fn close_out(&self, position: &Position) -> Option<Decimal> {
        let client = match self.venues.get(&position.venue) {
            Some(client) => client,
            None => {
                warn!(venue = %position.venue, "no client to close position on");
                return None;
            }
        };
        let request = OrderRequest {
            market_id: position.market_id.clone(),
            outcome: position.outcome,
            side: Side::Sell,
            quantity: position.quantity,
            limit_price: position.current_price,
        };
        let response =
            tokio::time::timeout(self.config.order_timeout(), client.place_order(&request)).await;
        match response {
            Ok(Ok(result)) if result.accepted => {
                Some(result.filled_quantity * result.average_fill_price)
            }
            Ok(Ok(result)) => {
                warn!(
                    position_id = %position.id,
                    reason = result.failure_reason.as_deref().unwrap_or("rejected"),
                    "close order rejected"
                );
                None
            }
            Ok(Err(err)) => {
                warn!(position_id = %position.id, %err, "close order failed");
                None
            }
            Err(_) => {
                warn!(position_id = %position.id, "close order timed out");
                None
            }
        }
    }

    /// Validate, admit, execute, and reconcile one opportunity.
    async fn process_opportunity(
        &self,
        opportunity: Opportunity,
        stats: &mut CycleStats,
    ) -> Result<()> {
        let ctx = {
            let book = self.book.lock().await;
            ValidationContext {
                min_profit_per_unit: self.config.min_profit_per_unit,
                min_confidence: self.config.min_match_confidence,
                min_quantity: self.config.min_position_size,
                available_capital: book.tracker.cash(&opportunity.buy.venue),
                now: OffsetDateTime::now_utc(),
            }
        };

        if let Err(rejection) = validator::validate(&opportunity, &ctx) {
            debug!(opportunity = %opportunity.describe(), %rejection, "rejected");
            metrics::inc_opportunities_rejected(rejection.label());
            stats.opportunities_rejected += 1;
            self.ledger
                .save(LedgerRecord::opportunity(
                    format!("rejected [{}]: {}", opportunity.describe(), rejection),
                    Some(opportunity.net_profit_per_unit),
                ))
                .await?;
            return Ok(());
        }

        let admission = self.admit(&opportunity).await?;
        let (position_id, quantity, displaced) = match admission {
            Admission::Admitted {
                position_id,
                quantity,
                displaced,
            } => (position_id, quantity, displaced),
            Admission::Refused(reason) => {
                debug!(opportunity = %opportunity.describe(), %reason, "not admitted");
                metrics::inc_opportunities_rejected("not_admitted");
                stats.opportunities_rejected += 1;
                self.ledger
                    .save(LedgerRecord::opportunity(
                        format!("refused [{}]: {}", opportunity.describe(), reason),
                        Some(opportunity.net_profit_per_unit),
                    ))
                    .await?;
                return Ok(());
            }
        };

        // A displaced position is closed before its replacement trades.
        if let Some(displaced) = displaced {
            metrics::inc_positions_closed();
            let proceeds = self.close_out(&displaced).await;
            if let Some(proceeds) = proceeds {
                let mut book = self.book.lock().await;
                book.tracker.credit(&displaced.venue, proceeds);
            }
            self.ledger
                .save(LedgerRecord::position(
                    displaced.id,
                    format!("swapped out {} on {}", displaced.market_id, displaced.venue),
                    Some(displaced.unrealized_pnl()),
                ))
                .await?;
        }

        let opportunity = opportunity.with_recommended_quantity(quantity);
        info!(
            opportunity = %opportunity.describe(),
            %quantity,
            "executing opportunity"
        );
        metrics::inc_opportunities_executed();
        stats.opportunities_executed += 1;

        let (plan, report) = self
            .engine
            .execute_opportunity(&opportunity, quantity, &self.cancel)
            .await?;
        let buy_fill = plan.leg("buy").and_then(|l| l.fill);
        let sell_fill = plan.leg("sell").and_then(|l| l.fill);

        {
            let mut book = self.book.lock().await;
            match buy_fill {
                Some(fill) => {
                    book.manager
                        .reconcile_entry(position_id, fill.quantity, fill.average_price)?;
                    if let Err(err) = book.tracker.debit(&opportunity.buy.venue, fill.notional()) {
                        warn!(%err, "buy notional exceeded tracked cash");
                    }
                    metrics::inc_positions_opened();
                    stats.positions_opened += 1;
                }
                None => {
                    // Nothing was bought; the reservation comes back out.
                    book.manager.evict(position_id, ExitReason::ExecutionFailed)?;
                }
            }
            if let Some(fill) = sell_fill {
                book.tracker.credit(&opportunity.sell.venue, fill.notional());
            }
        }

        let realized = match (buy_fill, sell_fill) {
            (Some(buy), Some(sell)) => Some(sell.notional() - buy.notional()),
            _ => None,
        };
        self.ledger.save(LedgerRecord::execution(&report, realized)).await?;
        let position_note = if buy_fill.is_some() {
            format!(
                "opened {} {} on {}",
                opportunity.outcome, opportunity.buy.market_id, opportunity.buy.venue
            )
        } else {
            format!("execution failed, reservation released: {}", report.summary())
        };
        self.ledger
            .save(LedgerRecord::position(position_id, position_note, realized))
            .await?;
        Ok(())
    }

    /// Capacity check, swap decision, sizing, and reservation as one
    /// critical section.
    async fn admit(&self, opportunity: &Opportunity) -> Result<Admission> {
        let mut book = self.book.lock().await;

        // Size first so a refused admission never displaces anything.
        let portfolio_value = book.tracker.total_cash() + book.manager.total_market_value();
        let quantity = book.manager.size_position(opportunity, portfolio_value);
        if quantity < self.config.min_position_size {
            return Ok(Admission::Refused(format!(
                "sized quantity {} below minimum {}",
                quantity, self.config.min_position_size
            )));
        }

        let mut displaced = None;
        if !book.manager.has_capacity() {
            match book.manager.should_swap(opportunity) {
                Some(decision) => {
                    let evicted = book.manager.evict(decision.evict, ExitReason::Swapped)?;
                    displaced = Some(evicted);
                }
                None => {
                    return Ok(Admission::Refused(
                        "at capacity and improvement below swap threshold".to_string(),
                    ));
                }
            }
        }

        let position = Position::open(
            opportunity.buy.venue.clone(),
            opportunity.buy.market_id.clone(),
            opportunity.outcome,
            quantity,
            opportunity.buy_price,
        )
        .with_target(opportunity.sell_price);
        let position_id = position.id;
        book.manager.admit(position)?;

        Ok(Admission::Admitted {
            position_id,
            quantity,
            displaced,
        })
    }
}
