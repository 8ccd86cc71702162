use super::state::{AppState, StoreHandle};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    paths(serve_liveness, serve_readiness),
    components(schemas(HealthStatus, HealthReport)),
    tags((name = "health", description = "Service health probes"))
)]
pub struct HealthApiDoc;

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(serve_liveness))
        .route("/ready", routing::get(serve_readiness))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, ToSchema, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
}

#[utoipa::path(
    get,
    path = "/",
    context_path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is running", body = HealthReport)),
)]
async fn serve_liveness() -> impl IntoResponse {
    Json(HealthReport { status: HealthStatus::Up })
}

#[utoipa::path(
    get,
    path = "/ready",
    context_path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Observation store reachable", body = HealthReport),
        (status = 503, description = "Observation store unreachable", body = HealthReport),
    ),
)]
#[tracing::instrument(level = "trace", skip(store))]
async fn serve_readiness(State(store): State<StoreHandle>) -> impl IntoResponse {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthReport { status: HealthStatus::Up })),
        Err(error) => {
            tracing::warn!(?error, "observation store failed readiness probe");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport { status: HealthStatus::Down }),
            )
        },
    }
}
