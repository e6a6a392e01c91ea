//! Periodic reconciliation runner.
//!
//! - Schedule: runs every `interval` (first run one interval after spawn unless `run_on_start`)
//! - Manual trigger: `handle.trigger()`, coalesced into at most one pending run
//! - Shutdown: cancels the in-flight run and stops the loop
//! - Failures: logged; never stop the loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::reconcile::{ReconciliationService, RunFailure, RunTrigger};

#[derive(Debug, Clone)]
pub struct ReconciliationScheduler {
    pub interval: Duration,
    pub run_on_start: bool,
}

impl Default for ReconciliationScheduler {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(86_400),
            run_on_start: false,
        }
    }
}

/// Cloneable manual-trigger hook, handed to callers that must not own the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerTrigger(mpsc::Sender<()>);

impl SchedulerTrigger {
    /// Request a run outside the schedule.
    ///
    /// Triggers are coalesced (capacity 1). Returns `false` if one is already pending
    /// or the scheduler has stopped.
    pub fn fire(&self) -> bool {
        self.0.try_send(()).is_ok()
    }
}

/// Handle for the running scheduler (shutdown + trigger hook).
#[derive(Debug)]
pub struct SchedulerHandle {
    trigger: SchedulerTrigger,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn trigger(&self) -> bool {
        self.trigger.fire()
    }

    pub fn trigger_hook(&self) -> SchedulerTrigger {
        self.trigger.clone()
    }

    /// Stop the loop, cancelling any in-flight run, and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "reconciliation scheduler task ended abnormally");
        }
    }
}

impl ReconciliationScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn spawn(&self, service: Arc<ReconciliationService>, config: Arc<RunConfig>) -> SchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
        let shutdown = CancellationToken::new();

        let join = tokio::spawn(scheduler_loop(
            self.clone(),
            service,
            config,
            trigger_rx,
            shutdown.clone(),
        ));

        SchedulerHandle {
            trigger: SchedulerTrigger(trigger_tx),
            shutdown,
            join,
        }
    }
}

async fn scheduler_loop(
    cfg: ReconciliationScheduler,
    service: Arc<ReconciliationService>,
    config: Arc<RunConfig>,
    mut trigger_rx: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    info!(interval_secs = cfg.interval.as_secs(), "reconciliation scheduler started");

    let start = if cfg.run_on_start {
        Instant::now()
    } else {
        Instant::now() + cfg.interval
    };
    let mut ticker = tokio::time::interval_at(start, cfg.interval);
    // Keep a stable cadence even if a run overlaps a tick.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let trigger = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => RunTrigger::Scheduled,
            received = trigger_rx.recv() => match received {
                Some(()) => RunTrigger::Manual,
                None => break,
            },
        };

        let cancel = shutdown.child_token();
        match service.run(&config, trigger, &cancel).await {
            Ok(outcome) => info!(
                run_id = %outcome.run_id,
                trigger = %trigger,
                total_discrepancies = outcome.report.total_discrepancies,
                "scheduled reconciliation finished"
            ),
            Err(e) if matches!(e.failure, RunFailure::AlreadyRunning) => {
                info!(trigger = %trigger, "skipping trigger; a run is already in progress")
            }
            Err(e) => error!(
                trigger = %trigger,
                kind = e.kind(),
                error = %e,
                at = %e.at,
                "scheduled reconciliation failed"
            ),
        }
    }

    info!("reconciliation scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockrecon_inventory::{InventoryItem, SourceSide};

    use crate::notify::InMemoryNotifier;
    use crate::reports::{InMemoryReportStore, ReportStore};
    use crate::sources::FixedSource;

    fn service(store: Arc<InMemoryReportStore>) -> Arc<ReconciliationService> {
        Arc::new(ReconciliationService::new(
            Arc::new(FixedSource::from_items(SourceSide::A, vec![InventoryItem::new("A", "a", 1)])),
            Arc::new(FixedSource::from_items(SourceSide::B, vec![InventoryItem::new("a", "a", 2)])),
            store,
            Arc::new(InMemoryNotifier::new()),
        ))
    }

    async fn wait_for_reports(store: &InMemoryReportStore, count: usize) {
        for _ in 0..200 {
            if store.all().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} persisted reports");
    }

    #[tokio::test]
    async fn manual_trigger_runs_outside_schedule() {
        let store = Arc::new(InMemoryReportStore::new());
        let handle = ReconciliationScheduler::new(Duration::from_secs(3600))
            .spawn(service(store.clone()), Arc::new(RunConfig::default()));

        assert!(handle.trigger());
        wait_for_reports(&store, 1).await;

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.report.total_discrepancies, 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn interval_runs_repeatedly_until_shutdown() {
        let store = Arc::new(InMemoryReportStore::new());
        let scheduler = ReconciliationScheduler {
            interval: Duration::from_millis(20),
            run_on_start: true,
        };
        let handle = scheduler.spawn(service(store.clone()), Arc::new(RunConfig::default()));

        wait_for_reports(&store, 2).await;
        handle.shutdown().await;

        let after_shutdown = store.all().unwrap().len();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.all().unwrap().len(), after_shutdown);
    }
}
