use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockrecon_infra::reports::PersistError;
use stockrecon_infra::{RunError, RunFailure};

pub fn run_error_to_response(err: RunError) -> axum::response::Response {
    let status = match err.failure {
        RunFailure::AlreadyRunning => StatusCode::CONFLICT,
        RunFailure::Fetch { .. } | RunFailure::Integrity(_) => StatusCode::BAD_GATEWAY,
        RunFailure::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        axum::Json(json!({
            "error": err.kind(),
            "message": err.to_string(),
            "at": err.at,
        })),
    )
        .into_response()
}

pub fn persist_error_to_response(err: PersistError) -> axum::response::Response {
    match err {
        PersistError::Unavailable(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
