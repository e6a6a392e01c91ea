//! Reconciliation run orchestration.
//!
//! One run: both sources fetched concurrently, snapshots matched, report
//! assembled, persisted once, then handed to the notifier. Only fetch,
//! integrity and cancellation failures abort a run; persistence and
//! notification failures are logged and the report is still returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use stockrecon_core::{DomainError, ReportId, RunId};
use stockrecon_inventory::{
    DiscrepancyReport, InventorySnapshot, SourceItemCounts, SourceSide, match_snapshots,
};

use crate::config::RunConfig;
use crate::notify::Notifier;
use crate::reports::{PersistError, ReportRecord, ReportStore, StoredReport};
use crate::sources::{FetchError, InventorySource};

/// What started a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl core::fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        })
    }
}

#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,

    #[error("source {side} fetch failed: {source}")]
    Fetch {
        side: SourceSide,
        #[source]
        source: FetchError,
    },

    #[error("reconciliation aborted: {0}")]
    Integrity(#[from] DomainError),

    #[error("run cancelled")]
    Cancelled,
}

/// A run that did not produce a report.
#[derive(Debug, Error)]
#[error("{failure}")]
pub struct RunError {
    pub failure: RunFailure,
    pub at: DateTime<Utc>,
}

impl RunError {
    pub fn new(failure: RunFailure) -> Self {
        Self {
            failure,
            at: Utc::now(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self.failure {
            RunFailure::AlreadyRunning => "already_running",
            RunFailure::Fetch { .. } => "fetch_failed",
            RunFailure::Integrity(_) => "integrity_error",
            RunFailure::Cancelled => "cancelled",
        }
    }
}

impl From<RunFailure> for RunError {
    fn from(failure: RunFailure) -> Self {
        Self::new(failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// `None` when persistence failed.
    pub report_id: Option<ReportId>,
    pub notified: bool,
    pub report: DiscrepancyReport,
}

pub struct ReconciliationService {
    source_a: Arc<dyn InventorySource>,
    source_b: Arc<dyn InventorySource>,
    store: Arc<dyn ReportStore>,
    notifier: Arc<dyn Notifier>,
    in_flight: Mutex<()>,
}

impl ReconciliationService {
    pub fn new(
        source_a: Arc<dyn InventorySource>,
        source_b: Arc<dyn InventorySource>,
        store: Arc<dyn ReportStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source_a,
            source_b,
            store,
            notifier,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one reconciliation. Concurrent calls fail fast with `AlreadyRunning`.
    pub async fn run(
        &self,
        config: &RunConfig,
        trigger: RunTrigger,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!(trigger = %trigger, "reconciliation already running, rejecting trigger");
            return Err(RunFailure::AlreadyRunning.into());
        };

        let run_id = RunId::new();
        self.execute(run_id, config, trigger, cancel).await.map_err(|failure| {
            error!(run_id = %run_id, error = %failure, "reconciliation run aborted");
            RunError::new(failure)
        })
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub async fn latest_report(&self) -> Result<Option<StoredReport>, PersistError> {
        self.store.latest().await
    }

    #[instrument(skip(self, config, cancel), fields(run_id = %run_id, trigger = %trigger))]
    async fn execute(
        &self,
        run_id: RunId,
        config: &RunConfig,
        trigger: RunTrigger,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunFailure> {
        info!("reconciliation run started");

        let (snapshot_a, snapshot_b) = tokio::try_join!(
            fetch(self.source_a.as_ref(), cancel),
            fetch(self.source_b.as_ref(), cancel),
        )?;

        if cancel.is_cancelled() {
            return Err(RunFailure::Cancelled);
        }

        let outcome = match_snapshots(&snapshot_a, &snapshot_b, config.collision_policy, &config.ignore)?;
        for collision in &outcome.collisions {
            warn!(
                source = %collision.side,
                key = %collision.key,
                kept_sku = %collision.kept_sku,
                colliding_sku = %collision.colliding_sku,
                policy = ?config.collision_policy,
                "SKU collision within source"
            );
        }

        if cancel.is_cancelled() {
            return Err(RunFailure::Cancelled);
        }

        let report = DiscrepancyReport::assemble(
            Utc::now().date_naive(),
            outcome,
            SourceItemCounts::of(&snapshot_a, &snapshot_b),
        );
        info!(
            total_discrepancies = report.total_discrepancies,
            exact_matches = report.match_stats.exact_matches,
            strict_matches = report.match_stats.strict_matches,
            loose_matches = report.match_stats.loose_matches,
            ignored = report.match_stats.ignored,
            source_only_a = report.source_only_a.len(),
            source_only_b = report.source_only_b.len(),
            "report assembled"
        );

        let record = ReportRecord::new(run_id, report);
        let report_id = match self.store.persist(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(error = %e, "failed to persist report; continuing without report id");
                None
            }
        };
        let report = record.report;

        let notified = match self.notifier.notify(&report, &config.notification).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(error = %e, "failed to send reconciliation notification");
                false
            }
        };

        info!(report_id = ?report_id, notified, "reconciliation run completed");
        Ok(RunOutcome {
            run_id,
            report_id,
            notified,
            report,
        })
    }
}

async fn fetch(source: &dyn InventorySource, cancel: &CancellationToken) -> Result<InventorySnapshot, RunFailure> {
    let side = source.side();
    match source.fetch(cancel).await {
        Ok(snapshot) => {
            info!(source = %side, name = source.name(), items = snapshot.len(), "source fetched");
            Ok(snapshot)
        }
        Err(FetchError::Cancelled) => Err(RunFailure::Cancelled),
        Err(source_error) => Err(RunFailure::Fetch {
            side,
            source: source_error,
        }),
    }
}
