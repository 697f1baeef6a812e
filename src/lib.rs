//! Cross-venue prediction-market arbitrage engine.
//!
//! Watches binary-outcome listings on multiple venues, pairs markets that
//! describe the same event, and trades the price gap: buy the outcome where
//! it is cheap, sell it where it is dear.
//!
//! # Pipeline
//!
//! Each polling interval runs one decision cycle:
//!
//! ```text
//! venue snapshots -> matcher -> scorer -> validator -> portfolio -> execution
//!                                                          |            |
//!                                                        ledger <-------+
//! ```
//!
//! - [`matcher`]: pairs listings across venues by title similarity
//! - [`scorer`]: turns pairs into fee/slippage-adjusted opportunities
//! - [`validator`]: stateless pre-trade gate with structured rejections
//! - [`portfolio`]: capacity-bounded position set, sizing, swaps, stop-loss
//! - [`execution`]: dependency-ordered trade plans against venue clients
//! - [`coordinator`]: drives the cycle and persists outcomes
//! - [`venue`]: the venue-client boundary and mock implementation
//! - [`ledger`]: audit persistence for decisions and fills
//! - [`config`]: configuration loading from environment
//! - [`error`]: unified error types
//! - [`metrics`]: Prometheus counters and histograms

pub mod config;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod matcher;
pub mod metrics;
pub mod portfolio;
pub mod scorer;
pub mod utils;
pub mod validator;
pub mod venue;

pub use config::Config;
pub use error::{BotError, Result};
