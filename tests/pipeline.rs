//! End-to-end decision-cycle tests over mock venues.
//!
//! These run the full pipeline (match, score, validate, admit, execute,
//! reconcile, persist) with scripted venue behavior and no network access.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crossarb::config::Config;
use crossarb::coordinator::Coordinator;
use crossarb::ledger::Ledger;
use crossarb::ledger::{MemoryLedger, RecordFilter, RecordKind};
use crossarb::venue::mock::{ListingBuilder, MockVenueClient, OrderBehavior};
use crossarb::venue::{Side, VenueRegistry};

fn test_config() -> Config {
    Config {
        min_match_confidence: 0.5,
        min_volume: Decimal::ZERO,
        min_profit_per_unit: dec!(0.01),
        fee_pct: Decimal::ZERO,
        slippage_pct: Decimal::ZERO,
        max_position_size: dec!(1000),
        min_position_size: dec!(1),
        max_open_positions: 5,
        min_swap_improvement_pct: dec!(5),
        position_size_fraction: dec!(0.5),
        min_remaining_gain_pct: dec!(2),
        stop_loss_pct: dec!(20),
        max_hold_minutes: 24 * 60,
        order_timeout_ms: 1_000,
        max_fill_attempts: 4,
        poll_interval_secs: 1,
        paper_cash: dec!(10_000),
        metrics_port: 9090,
        metrics_enabled: false,
        rust_log: "info".to_string(),
        verbose: false,
    }
}

/// Venue A sells YES at 0.40 with 1000 liquidity, venue B at 0.55 with 800;
/// NO is 0.55 on both, so only the YES gap is tradable.
fn spread_venues() -> (MockVenueClient, MockVenueClient, VenueRegistry) {
    let alpha = MockVenueClient::new("alpha");
    alpha.add_listing(
        ListingBuilder::new("alpha", "a-fed", "Fed cuts rates at the September 2026 meeting")
            .prices(dec!(0.40), dec!(0.55))
            .volume(dec!(10_000))
            .liquidity(dec!(1000))
            .build(),
    );

    let beta = MockVenueClient::new("beta");
    beta.add_listing(
        ListingBuilder::new("beta", "b-fed", "Fed cuts rates at September 2026 FOMC meeting")
            .prices(dec!(0.55), dec!(0.55))
            .volume(dec!(10_000))
            .liquidity(dec!(800))
            .build(),
    );

    let mut registry = VenueRegistry::new();
    registry.register(Arc::new(alpha.clone()));
    registry.register(Arc::new(beta.clone()));
    (alpha, beta, registry)
}

#[tokio::test]
async fn yes_spread_is_traded_within_liquidity_bounds() {
    let (alpha, beta, registry) = spread_venues();
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = Coordinator::new(test_config(), registry, ledger.clone());
    coordinator.seed_balances().await;

    let stats = coordinator.run_cycle().await.unwrap();

    // Exactly one opportunity: the YES gap. The flat NO prices net zero.
    assert_eq!(stats.pairs_matched, 1);
    assert_eq!(stats.opportunities_scored, 1);
    assert_eq!(stats.opportunities_executed, 1);
    assert_eq!(stats.positions_opened, 1);

    // Buy on the cheap venue, sell on the dear one, never above the
    // thinner book's 800 contracts.
    let buys = alpha.order_log();
    let sells = beta.order_log();
    assert_eq!(buys.len(), 1);
    assert_eq!(sells.len(), 1);
    assert_eq!(buys[0].side, Side::Buy);
    assert_eq!(sells[0].side, Side::Sell);
    assert_eq!(buys[0].quantity, sells[0].quantity);
    assert!(buys[0].quantity <= dec!(800));
    assert_eq!(buys[0].limit_price, dec!(0.40));
    assert_eq!(sells[0].limit_price, dec!(0.55));

    // The round trip is on the books with its realized profit.
    let executions = ledger
        .query(&RecordFilter {
            kind: Some(RecordKind::ExecutionFinished),
            ..RecordFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    let expected = dec!(0.15) * buys[0].quantity;
    assert_eq!(executions[0].profit, Some(expected));
}

#[tokio::test]
async fn fees_and_slippage_can_erase_the_edge() {
    let (alpha, beta, registry) = spread_venues();
    let config = Config {
        // 0.40 * 1.10 * 1.10 = 0.484 buy vs 0.55 * 0.90 * 0.90 = 0.4455 sell.
        fee_pct: dec!(0.10),
        slippage_pct: dec!(0.10),
        ..test_config()
    };
    let coordinator = Coordinator::new(config, registry, Arc::new(MemoryLedger::new()));
    coordinator.seed_balances().await;

    let stats = coordinator.run_cycle().await.unwrap();
    assert_eq!(stats.pairs_matched, 1);
    assert_eq!(stats.opportunities_scored, 0);
    assert!(alpha.order_log().is_empty());
    assert!(beta.order_log().is_empty());
}

#[tokio::test]
async fn buy_failure_leaves_no_position_and_no_sell_order() {
    let (alpha, beta, registry) = spread_venues();
    alpha.set_order_behavior("a-fed", OrderBehavior::Reject("post-only cross".into()));
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = Coordinator::new(test_config(), registry, ledger.clone());
    coordinator.seed_balances().await;

    let stats = coordinator.run_cycle().await.unwrap();
    assert_eq!(stats.opportunities_executed, 1);
    assert_eq!(stats.positions_opened, 0);
    assert!(beta.order_log().is_empty());

    // The failure is auditable with the venue's reason.
    let executions = ledger
        .query(&RecordFilter {
            kind: Some(RecordKind::ExecutionFinished),
            ..RecordFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    assert!(executions[0].reason.contains("post-only cross"));
}

#[tokio::test]
async fn partial_fills_still_complete_the_round_trip() {
    let (alpha, beta, registry) = spread_venues();
    alpha.set_order_behavior("a-fed", OrderBehavior::PartialFills(vec![dec!(0.25), dec!(0.5)]));
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = Coordinator::new(test_config(), registry, ledger.clone());
    coordinator.seed_balances().await;

    let stats = coordinator.run_cycle().await.unwrap();
    assert_eq!(stats.positions_opened, 1);

    // Three submissions on the buy side: 25%, then 50% of the rest, then
    // the remainder.
    assert_eq!(alpha.order_log().len(), 3);
    // The sell still covers the full target quantity.
    assert_eq!(beta.order_log().len(), 1);
    assert_eq!(beta.order_log()[0].quantity, alpha.order_log()[0].quantity);
}

#[tokio::test]
async fn timed_out_venue_fails_the_plan_cleanly() {
    let (alpha, beta, registry) = spread_venues();
    alpha.set_order_behavior("a-fed", OrderBehavior::TimeOut);
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = Coordinator::new(test_config(), registry, ledger.clone());
    coordinator.seed_balances().await;

    let stats = coordinator.run_cycle().await.unwrap();
    assert_eq!(stats.positions_opened, 0);
    assert!(beta.order_log().is_empty());
    // The book carries nothing forward into the next cycle.
    assert_eq!(coordinator.portfolio_value().await, dec!(20_000));
}

#[tokio::test]
async fn repeated_cycles_are_deterministic_when_nothing_changes() {
    let (_, _, registry) = spread_venues();
    // Threshold high enough that nothing trades, so state never changes.
    let config = Config {
        min_profit_per_unit: dec!(0.50),
        ..test_config()
    };
    let ledger = Arc::new(MemoryLedger::new());
    let coordinator = Coordinator::new(config, registry, ledger.clone());
    coordinator.seed_balances().await;

    let first = coordinator.run_cycle().await.unwrap();
    let second = coordinator.run_cycle().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.opportunities_rejected, 1);

    // Every rejection left an audit record.
    let rejections = ledger
        .query(&RecordFilter {
            kind: Some(RecordKind::OpportunityConsidered),
            ..RecordFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(rejections.len(), 2);
}

#[tokio::test]
async fn cancelled_coordinator_stops_scheduling() {
    let (alpha, beta, registry) = spread_venues();
    let coordinator = Coordinator::new(test_config(), registry, Arc::new(MemoryLedger::new()));
    coordinator.seed_balances().await;

    coordinator.cancel_handle().cancel();
    let stats = coordinator.run_cycle().await.unwrap();

    // Opportunities are still observed but nothing is admitted or sent out.
    assert_eq!(stats.opportunities_scored, 1);
    assert_eq!(stats.opportunities_executed, 0);
    assert!(alpha.order_log().is_empty());
    assert!(beta.order_log().is_empty());
}
