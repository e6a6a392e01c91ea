use std::collections::VecDeque;
use std::sync::RwLock;

use async_trait::async_trait;

use stockrecon_core::ReportId;

use super::{PersistError, ReportRecord, ReportStore, StoredReport};

/// Reports kept by [`InMemoryReportStore::new`].
pub const DEFAULT_RETAINED_REPORTS: usize = 30;

/// In-memory report store.
///
/// Intended for tests/dev. Keeps the most recent `retain` reports; older ones are dropped.
#[derive(Debug)]
pub struct InMemoryReportStore {
    reports: RwLock<VecDeque<StoredReport>>,
    retain: usize,
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_REPORTS)
    }
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retain` reports (at least one).
    pub fn with_retention(retain: usize) -> Self {
        Self {
            reports: RwLock::new(VecDeque::new()),
            retain: retain.max(1),
        }
    }

    /// Retained reports, oldest first.
    pub fn all(&self) -> Result<Vec<StoredReport>, PersistError> {
        self.reports
            .read()
            .map(|r| r.iter().cloned().collect())
            .map_err(|_| PersistError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn persist(&self, record: &ReportRecord) -> Result<ReportId, PersistError> {
        let id = ReportId::new();
        let mut reports = self
            .reports
            .write()
            .map_err(|_| PersistError::Unavailable("lock poisoned".to_string()))?;

        reports.push_back(StoredReport {
            id,
            run_id: record.run_id,
            created_at: record.created_at,
            report: record.report.clone(),
        });
        while reports.len() > self.retain {
            reports.pop_front();
        }
        Ok(id)
    }

    async fn latest(&self) -> Result<Option<StoredReport>, PersistError> {
        let reports = self
            .reports
            .read()
            .map_err(|_| PersistError::Unavailable("lock poisoned".to_string()))?;
        Ok(reports.back().cloned())
    }
}
