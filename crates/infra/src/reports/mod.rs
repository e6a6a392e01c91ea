//! Report persistence.
//!
//! A run writes its report exactly once. Persistence failures never fail the
//! run; the caller logs them and returns the report without an id.

mod in_memory;
mod postgres;

pub use in_memory::{DEFAULT_RETAINED_REPORTS, InMemoryReportStore};
pub use postgres::PostgresReportStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockrecon_core::{ReportId, RunId};
use stockrecon_inventory::DiscrepancyReport;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Database(String),

    #[error("failed to serialize report: {0}")]
    Serialization(String),

    #[error("report store unavailable: {0}")]
    Unavailable(String),
}

/// What a run hands to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub report: DiscrepancyReport,
}

impl ReportRecord {
    pub fn new(run_id: RunId, report: DiscrepancyReport) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            report,
        }
    }
}

/// A persisted report as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: ReportId,
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub report: DiscrepancyReport,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn persist(&self, record: &ReportRecord) -> Result<ReportId, PersistError>;

    /// Most recently persisted report, if any.
    async fn latest(&self) -> Result<Option<StoredReport>, PersistError>;
}
