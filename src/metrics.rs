//! Prometheus metrics for the decision cycle and execution path.
//!
//! This module provides metrics for:
//! - Decision cycle latency
//! - Listing fetch latency per venue
//! - Opportunity detection / validation / execution counters
//! - Leg execution and position lifecycle counters

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Decision cycle latency metric name.
pub const METRIC_CYCLE_LATENCY: &str = "decision_cycle_latency_ms";
/// Listing fetch latency metric name.
pub const METRIC_LISTING_FETCH_LATENCY: &str = "listing_fetch_latency_ms";
/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// Matched pairs counter metric name.
pub const METRIC_PAIRS_MATCHED: &str = "pairs_matched_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Opportunities rejected counter metric name.
pub const METRIC_OPPORTUNITIES_REJECTED: &str = "opportunities_rejected_total";
/// Opportunities executed counter metric name.
pub const METRIC_OPPORTUNITIES_EXECUTED: &str = "opportunities_executed_total";
/// Legs executed counter metric name.
pub const METRIC_LEGS_EXECUTED: &str = "legs_executed_total";
/// Legs failed counter metric name.
pub const METRIC_LEGS_FAILED: &str = "legs_failed_total";
/// Plans completed counter metric name.
pub const METRIC_PLANS_COMPLETED: &str = "plans_completed_total";
/// Plans failed counter metric name.
pub const METRIC_PLANS_FAILED: &str = "plans_failed_total";
/// Positions opened counter metric name.
pub const METRIC_POSITIONS_OPENED: &str = "positions_opened_total";
/// Positions closed counter metric name.
pub const METRIC_POSITIONS_CLOSED: &str = "positions_closed_total";
/// Forced exits counter metric name.
pub const METRIC_FORCED_EXITS: &str = "forced_exits_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_CYCLE_LATENCY,
        "Full decision cycle latency in milliseconds"
    );
    describe_histogram!(
        METRIC_LISTING_FETCH_LATENCY,
        "Listing snapshot fetch latency in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order submission latency in milliseconds"
    );

    // Counters
    describe_counter!(METRIC_PAIRS_MATCHED, "Total cross-venue pairs matched");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total arbitrage opportunities detected"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_REJECTED,
        "Total opportunities rejected by validation"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_EXECUTED,
        "Total opportunities sent to execution"
    );
    describe_counter!(METRIC_LEGS_EXECUTED, "Total plan legs fully executed");
    describe_counter!(METRIC_LEGS_FAILED, "Total plan legs that failed");
    describe_counter!(METRIC_PLANS_COMPLETED, "Total trade plans completed");
    describe_counter!(METRIC_PLANS_FAILED, "Total trade plans failed");
    describe_counter!(METRIC_POSITIONS_OPENED, "Total positions opened");
    describe_counter!(METRIC_POSITIONS_CLOSED, "Total positions closed");
    describe_counter!(METRIC_FORCED_EXITS, "Total stop-loss or max-hold exits");

    debug!("Metrics initialized");
}

/// Record full decision cycle latency.
pub fn record_cycle_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_CYCLE_LATENCY).record(latency_ms);
}

/// Record listing fetch latency for one venue.
pub fn record_listing_fetch_latency(start: Instant, venue: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_LISTING_FETCH_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Record order submission latency for one venue.
pub fn record_order_submit_latency(start: Instant, venue: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDER_SUBMIT_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Increment matched pairs counter.
pub fn inc_pairs_matched(count: u64) {
    counter!(METRIC_PAIRS_MATCHED).increment(count);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected(count: u64) {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(count);
}

/// Increment opportunities rejected counter, labeled by rejection kind.
pub fn inc_opportunities_rejected(reason: &str) {
    counter!(METRIC_OPPORTUNITIES_REJECTED, "reason" => reason.to_string()).increment(1);
}

/// Increment opportunities executed counter.
pub fn inc_opportunities_executed() {
    counter!(METRIC_OPPORTUNITIES_EXECUTED).increment(1);
}

/// Increment legs executed counter.
pub fn inc_legs_executed() {
    counter!(METRIC_LEGS_EXECUTED).increment(1);
}

/// Increment legs failed counter.
pub fn inc_legs_failed() {
    counter!(METRIC_LEGS_FAILED).increment(1);
}

/// Increment plans completed counter.
pub fn inc_plans_completed() {
    counter!(METRIC_PLANS_COMPLETED).increment(1);
}

/// Increment plans failed counter.
pub fn inc_plans_failed() {
    counter!(METRIC_PLANS_FAILED).increment(1);
}

/// Increment positions opened counter.
pub fn inc_positions_opened() {
    counter!(METRIC_POSITIONS_OPENED).increment(1);
}

/// Increment positions closed counter.
pub fn inc_positions_closed() {
    counter!(METRIC_POSITIONS_CLOSED).increment(1);
}

/// Increment forced exits counter, labeled by exit reason.
pub fn inc_forced_exits(reason: &str) {
    counter!(METRIC_FORCED_EXITS, "reason" => reason.to_string()).increment(1);
}
