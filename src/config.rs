//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Matching Parameters ===
    /// Minimum title-match confidence to pair two listings (0..1).
    #[serde(default = "default_min_confidence")]
    pub min_match_confidence: f64,

    /// Minimum traded volume for a listing to be considered.
    #[serde(default = "default_min_volume")]
    pub min_volume: Decimal,

    // === Scoring Parameters ===
    /// Minimum net profit per contract for an opportunity to survive.
    #[serde(default = "default_min_profit")]
    pub min_profit_per_unit: Decimal,

    /// Flat taker fee applied per leg (e.g. 0.02 = 2%).
    #[serde(default = "default_fee_pct")]
    pub fee_pct: Decimal,

    /// Flat slippage assumption per leg (price moves against the taker).
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: Decimal,

    /// Hard cap on contracts per opportunity.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,

    /// Floor on contracts per opportunity; smaller opportunities are
    /// discarded, never rounded up.
    #[serde(default = "default_min_position_size")]
    pub min_position_size: Decimal,

    // === Portfolio Parameters ===
    /// Maximum concurrent open positions.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,

    /// Minimum improvement (percentage points) before swapping out the
    /// weakest position for a new opportunity.
    #[serde(default = "default_swap_improvement")]
    pub min_swap_improvement_pct: Decimal,

    /// Fraction of portfolio value allocated per position.
    #[serde(default = "default_size_fraction")]
    pub position_size_fraction: Decimal,

    /// Minimum acceptable remaining gain before a position counts as
    /// played out.
    #[serde(default = "default_min_remaining_gain")]
    pub min_remaining_gain_pct: Decimal,

    /// Stop-loss threshold in percent (20 = exit at -20% P&L).
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: Decimal,

    /// Maximum minutes to hold a position.
    #[serde(default = "default_max_hold_minutes")]
    pub max_hold_minutes: u64,

    // === Execution Parameters ===
    /// Per-venue-call deadline in milliseconds.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,

    /// Maximum order submissions per leg while chasing partial fills.
    #[serde(default = "default_max_fill_attempts")]
    pub max_fill_attempts: u32,

    // === Scheduling ===
    /// Seconds between decision cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    // === Paper Trading ===
    /// Starting cash per venue in paper mode.
    #[serde(default = "default_paper_cash")]
    pub paper_cash: Decimal,

    // === Observability ===
    /// HTTP port for the Prometheus scrape endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Whether to install the Prometheus exporter.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_min_volume() -> Decimal {
    Decimal::new(100, 0)
}

fn default_min_profit() -> Decimal {
    Decimal::new(2, 2) // 0.02 per contract
}

fn default_fee_pct() -> Decimal {
    Decimal::new(2, 2) // 2%
}

fn default_slippage_pct() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_max_position_size() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_min_position_size() -> Decimal {
    Decimal::new(10, 0)
}

fn default_max_open_positions() -> usize {
    5
}

fn default_swap_improvement() -> Decimal {
    Decimal::new(5, 0) // 5 points
}

fn default_size_fraction() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_min_remaining_gain() -> Decimal {
    Decimal::new(2, 0)
}

fn default_stop_loss() -> Decimal {
    Decimal::new(20, 0)
}

fn default_max_hold_minutes() -> u64 {
    24 * 60
}

fn default_order_timeout_ms() -> u64 {
    5_000
}

fn default_max_fill_attempts() -> u32 {
    4
}

fn default_poll_interval() -> u64 {
    15
}

fn default_paper_cash() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_metrics_port() -> u16 {
    9_090
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_match_confidence) {
            return Err("MIN_MATCH_CONFIDENCE must be within [0, 1]".to_string());
        }

        if self.fee_pct < Decimal::ZERO || self.fee_pct >= Decimal::ONE {
            return Err("FEE_PCT must be within [0, 1)".to_string());
        }

        if self.slippage_pct < Decimal::ZERO || self.slippage_pct >= Decimal::ONE {
            return Err("SLIPPAGE_PCT must be within [0, 1)".to_string());
        }

        if self.min_position_size <= Decimal::ZERO {
            return Err("MIN_POSITION_SIZE must be positive".to_string());
        }

        if self.max_position_size < self.min_position_size {
            return Err("MAX_POSITION_SIZE must be at least MIN_POSITION_SIZE".to_string());
        }

        if self.max_open_positions == 0 {
            return Err("MAX_OPEN_POSITIONS must be at least 1".to_string());
        }

        if self.position_size_fraction <= Decimal::ZERO
            || self.position_size_fraction > Decimal::ONE
        {
            return Err("POSITION_SIZE_FRACTION must be within (0, 1]".to_string());
        }

        if self.poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be at least 1".to_string());
        }

        if self.max_fill_attempts == 0 {
            return Err("MAX_FILL_ATTEMPTS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Per-venue-call deadline as a [`Duration`].
    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    /// Maximum hold duration as a [`Duration`].
    pub fn max_hold(&self) -> Duration {
        Duration::from_secs(self.max_hold_minutes * 60)
    }

    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            min_match_confidence: default_min_confidence(),
            min_volume: default_min_volume(),
            min_profit_per_unit: default_min_profit(),
            fee_pct: default_fee_pct(),
            slippage_pct: default_slippage_pct(),
            max_position_size: default_max_position_size(),
            min_position_size: default_min_position_size(),
            max_open_positions: default_max_open_positions(),
            min_swap_improvement_pct: default_swap_improvement(),
            position_size_fraction: default_size_fraction(),
            min_remaining_gain_pct: default_min_remaining_gain(),
            stop_loss_pct: default_stop_loss(),
            max_hold_minutes: default_max_hold_minutes(),
            order_timeout_ms: default_order_timeout_ms(),
            max_fill_attempts: default_max_fill_attempts(),
            poll_interval_secs: default_poll_interval(),
            paper_cash: default_paper_cash(),
            metrics_port: default_metrics_port(),
            metrics_enabled: default_true(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_profit_per_unit, Decimal::new(2, 2));
        assert_eq!(config.max_open_positions, 5);
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
    }

    #[test]
    fn validate_rejects_confidence_out_of_range() {
        let config = Config {
            min_match_confidence: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_size_bounds() {
        let config = Config {
            max_position_size: Decimal::new(5, 0),
            min_position_size: Decimal::new(10, 0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = Config {
            max_open_positions: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
