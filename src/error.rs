//! Unified error types for the arbitrage engine.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Venue collaborator error.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    /// Trade-plan execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Portfolio/position invariant error.
    #[error("portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),

    /// Persistence collaborator error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a venue collaborator.
#[derive(Error, Debug)]
pub enum VenueError {
    /// The venue did not answer within the per-call deadline.
    #[error("venue {venue} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Venue identifier.
        venue: String,
        /// Milliseconds waited before giving up.
        elapsed_ms: u64,
    },

    /// Transport-level failure (connection refused, reset, DNS).
    #[error("venue {venue} transport failure: {reason}")]
    Transport {
        /// Venue identifier.
        venue: String,
        /// Underlying failure description.
        reason: String,
    },

    /// The venue rejected the request outright.
    #[error("venue {venue} rejected request: {reason}")]
    Rejected {
        /// Venue identifier.
        venue: String,
        /// Rejection reason from the venue.
        reason: String,
    },

    /// A listing snapshot failed field validation.
    #[error("malformed listing {market_id} on {venue}: {reason}")]
    MalformedListing {
        /// Venue identifier.
        venue: String,
        /// Venue-native market id.
        market_id: String,
        /// What was wrong with the snapshot.
        reason: String,
    },

    /// Rate limited by the venue.
    #[error("venue {venue} rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Venue identifier.
        venue: String,
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },
}

/// Trade-plan construction and scheduling errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Plan has no legs to execute.
    #[error("plan {plan_id} has no legs")]
    EmptyPlan {
        /// The offending plan.
        plan_id: Uuid,
    },

    /// A leg names a dependency that is not part of the plan.
    #[error("plan {plan_id}: leg {leg_id} depends on unknown leg {dependency}")]
    UnknownDependency {
        /// The offending plan.
        plan_id: Uuid,
        /// Leg declaring the dependency.
        leg_id: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// Duplicate leg ids within one plan.
    #[error("plan {plan_id}: duplicate leg id {leg_id}")]
    DuplicateLegId {
        /// The offending plan.
        plan_id: Uuid,
        /// The duplicated id.
        leg_id: String,
    },

    /// Plan has already reached a terminal status.
    #[error("plan {plan_id} is already terminal ({status})")]
    PlanAlreadyTerminal {
        /// The offending plan.
        plan_id: Uuid,
        /// Its terminal status.
        status: String,
    },

    /// No venue client registered for a leg's target venue.
    #[error("no venue client registered for {venue}")]
    UnknownVenue {
        /// The unregistered venue identifier.
        venue: String,
    },
}

/// Position-set invariant violations.
#[derive(Error, Debug)]
pub enum PortfolioError {
    /// Active positions must have non-zero quantity.
    #[error("position {position_id} has zero quantity")]
    ZeroQuantity {
        /// The offending position.
        position_id: Uuid,
    },

    /// Operation referenced a position not in the active set.
    #[error("unknown position {position_id}")]
    UnknownPosition {
        /// The missing position id.
        position_id: Uuid,
    },

    /// Admission would exceed the configured maximum.
    #[error("admission refused: {active} active positions at configured maximum {max}")]
    CapacityExceeded {
        /// Current active count.
        active: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Sizing produced a non-positive quantity.
    #[error("invalid position size {quantity}")]
    InvalidSize {
        /// The computed quantity.
        quantity: Decimal,
    },
}

/// Persistence collaborator errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The store rejected or failed the write.
    #[error("failed to save record: {0}")]
    SaveFailed(String),

    /// The store failed the read.
    #[error("failed to query records: {0}")]
    QueryFailed(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_error_display_includes_venue() {
        let err = VenueError::Timeout {
            venue: "alpha".to_string(),
            elapsed_ms: 500,
        };
        assert_eq!(err.to_string(), "venue alpha timed out after 500ms");
    }

    #[test]
    fn errors_convert_into_bot_error() {
        let err: BotError = PortfolioError::ZeroQuantity {
            position_id: Uuid::nil(),
        }
        .into();
        assert!(matches!(err, BotError::Portfolio(_)));
    }
}
