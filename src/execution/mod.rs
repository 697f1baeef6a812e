//! Trade plan execution: dependency-ordered, batch-concurrent order entry.
//!
//! The scheduler walks the plan's leg graph in batches. A leg becomes
//! eligible once every dependency is in the executed set; eligible legs are
//! dispatched to their venues concurrently, which is safe because the
//! dependency graph already enforces correctness ordering. Every venue call
//! carries its own timeout; a timed-out leg fails and is not retried in
//! place. Partial fills are re-placed for the remainder up to a bounded
//! number of attempts, folding each fill into the leg's volume-weighted
//! average price.

pub mod plan;

pub use plan::{Leg, LegFill, LegRole, LegStatus, PlanStatus, TradePlan};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::metrics;
use crate::scorer::Opportunity;
use crate::venue::{OrderRequest, VenueClient, VenueRegistry};

/// Execution engine tuning.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    /// Per-venue-call deadline.
    pub order_timeout: Duration,
    /// Maximum order submissions per leg while chasing partial fills.
    pub max_fill_attempts: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_timeout: Duration::from_secs(5),
            max_fill_attempts: 4,
        }
    }
}

/// Cooperative cancellation token checked between leg batches.
///
/// Cancellation means "do not schedule further legs"; an order already
/// submitted to a venue is never recalled by this engine.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// New un-cancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A leg that did not execute, with a human-readable reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLeg {
    /// Leg id within the plan.
    pub leg_id: String,
    /// Why the leg failed.
    pub reason: String,
}

/// Outcome of one plan execution, suitable for audit persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The executed plan.
    pub plan_id: Uuid,
    /// Terminal plan status.
    pub status: PlanStatus,
    /// Leg ids that reached full fill, in execution order.
    pub executed_legs: Vec<String>,
    /// Legs that failed, with reasons.
    pub failed_legs: Vec<FailedLeg>,
    /// Legs never scheduled (cancelled plan or dependency deadlock).
    pub skipped_legs: Vec<String>,
}

impl ExecutionReport {
    /// One-line human-readable summary for audit records.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "plan {} {}: {} executed, {} failed, {} skipped",
            self.plan_id,
            self.status,
            self.executed_legs.len(),
            self.failed_legs.len(),
            self.skipped_legs.len(),
        );
        for failed in &self.failed_legs {
            out.push_str(&format!("; {} failed: {}", failed.leg_id, failed.reason));
        }
        out
    }

    /// Whether every leg executed.
    pub fn is_clean(&self) -> bool {
        self.status == PlanStatus::Completed
            && self.failed_legs.is_empty()
            && self.skipped_legs.is_empty()
    }
}

enum LegOutcome {
    Executed(LegFill),
    Failed(String),
}

/// Turns trade plans into venue order calls.
pub struct ExecutionEngine {
    venues: VenueRegistry,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    /// New engine over a fixed venue registry.
    pub fn new(venues: VenueRegistry, config: ExecutionConfig) -> Self {
        Self { venues, config }
    }

    /// Synthesize and execute the standard two-leg plan for a sized
    /// opportunity. The sell leg depends on the buy leg, so a failed buy
    /// means the sell is never submitted.
    pub async fn execute_opportunity(
        &self,
        opportunity: &Opportunity,
        quantity: Decimal,
        cancel: &CancelHandle,
    ) -> Result<(TradePlan, ExecutionReport), ExecutionError> {
        let mut plan = TradePlan::for_opportunity(opportunity, quantity)?;
        let report = self.execute(&mut plan, cancel).await?;
        Ok((plan, report))
    }

    /// Run one plan to a terminal status.
    pub async fn execute(
        &self,
        plan: &mut TradePlan,
        cancel: &CancelHandle,
    ) -> Result<ExecutionReport, ExecutionError> {
        if plan.is_terminal() {
            return Err(ExecutionError::PlanAlreadyTerminal {
                plan_id: plan.id,
                status: plan.status.to_string(),
            });
        }
        // Resolve every leg's venue up front so a bad plan fails before any
        // order reaches a venue.
        for leg in &plan.legs {
            if self.venues.get(&leg.listing.venue).is_none() {
                return Err(ExecutionError::UnknownVenue {
                    venue: leg.listing.venue.to_string(),
                });
            }
        }

        plan.status = PlanStatus::Executing;
        info!(plan_id = %plan.id, name = %plan.name, legs = plan.legs.len(), "executing plan");

        let mut executed: Vec<String> = Vec::new();
        let mut executed_set: BTreeSet<String> = BTreeSet::new();
        let mut failed: Vec<FailedLeg> = Vec::new();
        let mut deadlocked = false;
        let mut was_cancelled = false;

        loop {
            if cancel.is_cancelled() {
                info!(plan_id = %plan.id, "plan cancelled between batches");
                was_cancelled = true;
                break;
            }

            let eligible: Vec<usize> = {
                let mut indices: Vec<usize> = plan
                    .legs
                    .iter()
                    .enumerate()
                    .filter(|(_, leg)| {
                        leg.status == LegStatus::Pending
                            && leg.depends_on.iter().all(|d| executed_set.contains(d))
                    })
                    .map(|(i, _)| i)
                    .collect();
                indices.sort_by_key(|&i| (plan.legs[i].priority, plan.legs[i].id.clone()));
                indices
            };

            if eligible.is_empty() {
                if !plan.legs.iter().any(|l| l.status == LegStatus::Pending) {
                    break;
                }
                let orphaned = mark_failed_dependents(plan);
                for leg_id in &orphaned {
                    let reason = plan
                        .leg(leg_id)
                        .and_then(|l| l.failure_reason.clone())
                        .unwrap_or_else(|| "dependency failed".to_string());
                    failed.push(FailedLeg {
                        leg_id: leg_id.clone(),
                        reason,
                    });
                    metrics::inc_legs_failed();
                }
                if plan.legs.iter().any(|l| l.status == LegStatus::Pending) {
                    warn!(
                        plan_id = %plan.id,
                        "dependency cycle among remaining legs, scheduler stopped"
                    );
                    deadlocked = true;
                }
                break;
            }

            // Mutually eligible legs go out concurrently; the dependency
            // graph has already enforced ordering between batches.
            let futures: Vec<_> = eligible
                .iter()
                .map(|&i| {
                    let leg = plan.legs[i].clone();
                    // Checked above.
                    let client = self.venues.get(&leg.listing.venue);
                    async move {
                        match client {
                            Some(client) => (leg.id.clone(), self.run_leg(client, &leg).await),
                            None => (
                                leg.id.clone(),
                                LegOutcome::Failed(format!(
                                    "no venue client for {}",
                                    leg.listing.venue
                                )),
                            ),
                        }
                    }
                })
                .collect();
            let outcomes = join_all(futures).await;

            for (leg_id, outcome) in outcomes {
                let leg = plan
                    .legs
                    .iter_mut()
                    .find(|l| l.id == leg_id)
                    .ok_or(ExecutionError::UnknownDependency {
                        plan_id: plan.id,
                        leg_id: leg_id.clone(),
                        dependency: leg_id.clone(),
                    })?;
                match outcome {
                    LegOutcome::Executed(fill) => {
                        leg.status = LegStatus::Executed;
                        leg.fill = Some(fill);
                        debug!(
                            plan_id = %plan.id,
                            leg_id = %leg.id,
                            quantity = %fill.quantity,
                            avg_price = %fill.average_price,
                            "leg executed"
                        );
                        executed.push(leg_id.clone());
                        executed_set.insert(leg_id);
                        metrics::inc_legs_executed();
                    }
                    LegOutcome::Failed(reason) => {
                        leg.status = LegStatus::Failed;
                        leg.failure_reason = Some(reason.clone());
                        warn!(plan_id = %plan.id, leg_id = %leg.id, %reason, "leg failed");
                        failed.push(FailedLeg {
                            leg_id,
                            reason,
                        });
                        metrics::inc_legs_failed();
                    }
                }
            }
        }

        let skipped: Vec<String> = plan
            .legs
            .iter()
            .filter(|l| l.status == LegStatus::Pending)
            .map(|l| l.id.clone())
            .collect();

        plan.status = if was_cancelled {
            PlanStatus::Cancelled
        } else if executed.is_empty() || deadlocked {
            PlanStatus::Failed
        } else {
            PlanStatus::Completed
        };
        match plan.status {
            PlanStatus::Completed => metrics::inc_plans_completed(),
            PlanStatus::Failed => metrics::inc_plans_failed(),
            _ => {}
        }

        let report = ExecutionReport {
            plan_id: plan.id,
            status: plan.status,
            executed_legs: executed,
            failed_legs: failed,
            skipped_legs: skipped,
        };
        info!(plan_id = %plan.id, status = %plan.status, summary = %report.summary(), "plan finished");
        Ok(report)
    }

    /// Drive one leg to full fill or failure. Partial fills re-place the
    /// remainder until the attempt cap runs out.
    async fn run_leg(&self, client: Arc<dyn VenueClient>, leg: &Leg) -> LegOutcome {
        let mut fill: Option<LegFill> = None;
        let mut remaining = leg.quantity;

        for attempt in 1..=self.config.max_fill_attempts {
            let request = OrderRequest {
                market_id: leg.listing.market_id.clone(),
                outcome: leg.outcome,
                side: leg.side,
                quantity: remaining,
                limit_price: leg.price,
            };

            let start = Instant::now();
            let response =
                tokio::time::timeout(self.config.order_timeout, client.place_order(&request))
                    .await;
            metrics::record_order_submit_latency(start, &leg.listing.venue.0);

            let result = match response {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => return LegOutcome::Failed(err.to_string()),
                Err(_) => {
                    return LegOutcome::Failed(format!(
                        "order timed out after {}ms",
                        self.config.order_timeout.as_millis()
                    ));
                }
            };

            if !result.accepted {
                let reason = result
                    .failure_reason
                    .unwrap_or_else(|| "order rejected".to_string());
                return LegOutcome::Failed(reason);
            }
            if result.filled_quantity <= Decimal::ZERO {
                return LegOutcome::Failed("order accepted but nothing filled".to_string());
            }

            let filled = result.filled_quantity.min(remaining);
            match &mut fill {
                Some(f) => f.accumulate(filled, result.average_fill_price),
                None => fill = Some(LegFill::new(filled, result.average_fill_price)),
            }
            remaining -= filled;

            if remaining <= Decimal::ZERO {
                // fill is always Some here.
                return match fill {
                    Some(f) => LegOutcome::Executed(f),
                    None => LegOutcome::Failed("fill bookkeeping lost".to_string()),
                };
            }
            debug!(
                leg_id = %leg.id,
                attempt,
                remaining = %remaining,
                "partial fill, re-placing remainder"
            );
        }

        LegOutcome::Failed(format!(
            "{} still unfilled after {} attempts",
            remaining, self.config.max_fill_attempts
        ))
    }
}

/// Mark every pending leg that depends, directly or transitively, on a
/// failed leg as failed itself. Returns the ids marked, in plan order.
fn mark_failed_dependents(plan: &mut TradePlan) -> Vec<String> {
    let mut orphaned = Vec::new();
    loop {
        let failed_ids: BTreeSet<String> = plan
            .legs
            .iter()
            .filter(|l| l.status == LegStatus::Failed)
            .map(|l| l.id.clone())
            .collect();
        let next = plan.legs.iter_mut().find(|l| {
            l.status == LegStatus::Pending && l.depends_on.iter().any(|d| failed_ids.contains(d))
        });
        match next {
            Some(leg) => {
                let culprit = leg
                    .depends_on
                    .iter()
                    .find(|d| failed_ids.contains(*d))
                    .cloned()
                    .unwrap_or_default();
                leg.status = LegStatus::Failed;
                leg.failure_reason = Some(format!("dependency {} failed", culprit));
                orphaned.push(leg.id.clone());
            }
            None => break,
        }
    }
    orphaned
}
