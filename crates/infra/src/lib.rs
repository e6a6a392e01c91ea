//! Infrastructure layer: configuration, source fetchers, report storage,
//! notification and run orchestration.

pub mod config;
pub mod notify;
pub mod reconcile;
pub mod reports;
pub mod retry;
pub mod scheduler;
pub mod sources;

pub use config::{AppConfig, ConfigError, ErpConfig, FetchSettings, NotificationConfig, RunConfig, WmsConfig};
pub use reconcile::{ReconciliationService, RunError, RunFailure, RunOutcome, RunTrigger};
pub use scheduler::{ReconciliationScheduler, SchedulerHandle, SchedulerTrigger};
