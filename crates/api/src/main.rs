use std::sync::Arc;

use stockrecon_infra::{AppConfig, ReconciliationScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockrecon_observability::init();

    let config = AppConfig::from_env()?;

    let services = stockrecon_api::app::services::build_services(&config).await?;
    let scheduler = ReconciliationScheduler::new(config.interval)
        .spawn(services.reconciliation.clone(), services.run_config.clone());
    let services = Arc::new(services.with_scheduler(scheduler.trigger_hook()));

    let app = stockrecon_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    scheduler.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}
