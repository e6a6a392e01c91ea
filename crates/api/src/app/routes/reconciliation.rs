use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use stockrecon_infra::RunTrigger;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/runs", post(start_run))
        .route("/reports/latest", get(latest_report))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
    /// `false` hands the run to the background scheduler and returns immediately.
    #[serde(default)]
    pub wait: Option<bool>,
}

pub async fn start_run(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<RunParams>,
) -> axum::response::Response {
    if params.wait == Some(false) {
        let Some(scheduler) = &services.scheduler else {
            return errors::json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "scheduler_unavailable",
                "background runs are not enabled",
            );
        };
        let queued = scheduler.fire();
        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": if queued { "queued" } else { "already_pending" },
            })),
        )
            .into_response();
    }

    // Dropping the request future (client gone) drops the run with it; the
    // token only covers explicit cancellation.
    let cancel = CancellationToken::new();
    match services
        .reconciliation
        .run(&services.run_config, RunTrigger::Manual, &cancel)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::run_error_to_response(e),
    }
}

pub async fn latest_report(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciliation.latest_report().await {
        Ok(Some(stored)) => (StatusCode::OK, Json(stored)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no report has been persisted yet"),
        Err(e) => errors::persist_error_to_response(e),
    }
}
