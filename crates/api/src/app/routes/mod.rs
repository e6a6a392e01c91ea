use axum::Router;

pub mod reconciliation;
pub mod system;

/// Router for all application endpoints (health is mounted separately).
pub fn router() -> Router {
    Router::new().nest("/reconciliation", reconciliation::router())
}
