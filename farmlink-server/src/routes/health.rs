use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use tracing::warn;

use crate::{app_state::AppState, db::bootstrap};

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
}

async fn healthz() -> impl IntoResponse {
    metrics::counter!("health_checks_total", "endpoint" => "healthz", "status" => "ok")
        .increment(1);
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcome = match state.pool.as_ref() {
        Some(pool) => bootstrap::ensure_readiness(pool)
            .await
            .map_err(|err| err.to_string()),
        None => state.store.ping().await.map_err(|err| err.to_string()),
    };

    match outcome {
        Ok(()) => {
            metrics::counter!("health_checks_total", "endpoint" => "readyz", "status" => "ok")
                .increment(1);
            (StatusCode::OK, Json(HealthResponse { status: "ready" }))
        }
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            metrics::counter!("health_checks_total", "endpoint" => "readyz", "status" => "error")
                .increment(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "degraded" }),
            )
        }
    }
}

pub fn create_health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
