//! Audit persistence collaborator.
//!
//! Every rejected opportunity, execution outcome, and position lifecycle
//! event is written to the ledger with a human-readable reason so decisions
//! can be audited later, not just read off a console log.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::execution::{ExecutionReport, PlanStatus};

/// What kind of event a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// An opportunity was scored and either accepted or rejected.
    OpportunityConsidered,
    /// A trade plan reached a terminal status.
    ExecutionFinished,
    /// A position was opened or closed.
    PositionEvent,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Record id.
    pub id: Uuid,
    /// When the event happened.
    pub recorded_at: OffsetDateTime,
    /// Event kind.
    pub kind: RecordKind,
    /// Plan involved, when applicable.
    pub plan_id: Option<Uuid>,
    /// Position involved, when applicable.
    pub position_id: Option<Uuid>,
    /// Terminal plan status, for execution records.
    pub plan_status: Option<PlanStatus>,
    /// Expected or realized profit, when known.
    pub profit: Option<Decimal>,
    /// Human-readable description of what happened and why.
    pub reason: String,
}

impl LedgerRecord {
    fn base(kind: RecordKind, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: OffsetDateTime::now_utc(),
            kind,
            plan_id: None,
            position_id: None,
            plan_status: None,
            profit: None,
            reason: reason.into(),
        }
    }

    /// Record an opportunity decision (accepted or rejected) with its reason.
    pub fn opportunity(reason: impl Into<String>, profit: Option<Decimal>) -> Self {
        let mut record = Self::base(RecordKind::OpportunityConsidered, reason);
        record.profit = profit;
        record
    }

    /// Record a finished plan from its execution report.
    pub fn execution(report: &ExecutionReport, profit: Option<Decimal>) -> Self {
        let mut record = Self::base(RecordKind::ExecutionFinished, report.summary());
        record.plan_id = Some(report.plan_id);
        record.plan_status = Some(report.status);
        record.profit = profit;
        record
    }

    /// Record a position lifecycle event.
    pub fn position(
        position_id: Uuid,
        reason: impl Into<String>,
        profit: Option<Decimal>,
    ) -> Self {
        let mut record = Self::base(RecordKind::PositionEvent, reason);
        record.position_id = Some(position_id);
        record.profit = profit;
        record
    }
}

/// Query filter for reading records back.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to one kind.
    pub kind: Option<RecordKind>,
    /// Restrict to one plan.
    pub plan_id: Option<Uuid>,
    /// Restrict to one position.
    pub position_id: Option<Uuid>,
    /// Only records at or after this time.
    pub since: Option<OffsetDateTime>,
}

impl RecordFilter {
    /// Whether a record passes the filter.
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(plan_id) = self.plan_id {
            if record.plan_id != Some(plan_id) {
                return false;
            }
        }
        if let Some(position_id) = self.position_id {
            if record.position_id != Some(position_id) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.recorded_at < since {
                return false;
            }
        }
        true
    }
}

/// Persistence boundary. Implemented over a real store in production
/// deployments; [`MemoryLedger`] backs tests and paper trading.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append one record.
    async fn save(&self, record: LedgerRecord) -> Result<(), LedgerError>;

    /// Read back records matching the filter, oldest first.
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>, LedgerError>;
}

/// In-memory ledger.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<LedgerRecord>>,
}

impl MemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether any record has been written.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn save(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>, LedgerError> {
        let records = self.records.lock().await;
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn save_and_query_by_kind() {
        let ledger = MemoryLedger::new();
        ledger
            .save(LedgerRecord::opportunity("below profit threshold", None))
            .await
            .unwrap();
        ledger
            .save(LedgerRecord::position(Uuid::new_v4(), "opened", Some(dec!(12))))
            .await
            .unwrap();

        let opportunities = ledger
            .query(&RecordFilter {
                kind: Some(RecordKind::OpportunityConsidered),
                ..RecordFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].reason, "below profit threshold");
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn query_by_position_and_time() {
        let ledger = MemoryLedger::new();
        let position_id = Uuid::new_v4();
        ledger
            .save(LedgerRecord::position(position_id, "opened", None))
            .await
            .unwrap();
        ledger
            .save(LedgerRecord::position(Uuid::new_v4(), "opened", None))
            .await
            .unwrap();

        let matched = ledger
            .query(&RecordFilter {
                position_id: Some(position_id),
                ..RecordFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);

        let future = ledger
            .query(&RecordFilter {
                since: Some(OffsetDateTime::now_utc() + time::Duration::hours(1)),
                ..RecordFilter::default()
            })
            .await
            .unwrap();
        assert!(future.is_empty());
    }
}
