use std::sync::Arc;

use anyhow::Context;

use stockrecon_infra::notify::LogNotifier;
use stockrecon_infra::reports::{InMemoryReportStore, PostgresReportStore, ReportStore};
use stockrecon_infra::sources::{ErpSource, FixedSource, InventorySource, WmsSource};
use stockrecon_infra::{AppConfig, ReconciliationService, RunConfig, SchedulerTrigger};
use stockrecon_inventory::SourceSide;

/// Everything the handlers need.
#[derive(Clone)]
pub struct AppServices {
    pub reconciliation: Arc<ReconciliationService>,
    pub run_config: Arc<RunConfig>,
    /// Present once the background scheduler is running.
    pub scheduler: Option<SchedulerTrigger>,
}

impl AppServices {
    pub fn new(reconciliation: Arc<ReconciliationService>, run_config: Arc<RunConfig>) -> Self {
        Self {
            reconciliation,
            run_config,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, trigger: SchedulerTrigger) -> Self {
        self.scheduler = Some(trigger);
        self
    }
}

/// Build services from configuration.
///
/// Unconfigured sources fall back to empty fixed sources (dev mode). Reports go
/// to Postgres when `USE_PERSISTENT_STORES` is on, otherwise stay in memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let source_a: Arc<dyn InventorySource> = match &config.erp {
        Some(erp) => Arc::new(ErpSource::new(erp.clone(), &config.fetch).context("failed to build ERP source")?),
        None => {
            tracing::warn!("ERP_BASE_URL not set; source A is an empty fixed source");
            Arc::new(FixedSource::empty(SourceSide::A))
        }
    };

    let source_b: Arc<dyn InventorySource> = match &config.wms {
        Some(wms) => Arc::new(WmsSource::new(wms.clone(), &config.fetch).context("failed to build WMS source")?),
        None => {
            tracing::warn!("WMS_BASE_URL not set; source B is an empty fixed source");
            Arc::new(FixedSource::empty(SourceSide::B))
        }
    };

    let store: Arc<dyn ReportStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresReportStore::connect(url)
                .await
                .context("failed to connect to report database")?;
            store
                .ensure_schema()
                .await
                .context("failed to prepare report schema")?;
            tracing::info!("using Postgres report store");
            Arc::new(store)
        }
        None => Arc::new(InMemoryReportStore::new()),
    };

    let reconciliation = Arc::new(ReconciliationService::new(
        source_a,
        source_b,
        store,
        Arc::new(LogNotifier),
    ));

    Ok(AppServices::new(reconciliation, Arc::new(config.run.clone())))
}
