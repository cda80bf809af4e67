// src/routes/health.rs
//! Health endpoints for the heatgrid service.
//!
//! - `GET /health` answers as long as the process serves HTTP; it never
//!   touches the database.
//! - `GET /health/db` round-trips a trivial query through the pool so
//!   orchestrators can hold traffic until PostgreSQL is reachable.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::ServiceResult;
use crate::Config;

/// JSON response body for the health endpoints.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

async fn live() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// A pool or query failure surfaces as a retryable `503`.
async fn ready(State((pool, _config)): State<(PgPool, Config)>) -> ServiceResult<Json<HealthResponse>> {
    // ---
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await?;
    Ok(Json(HealthResponse::ok()))
}

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/health", get(live))
        .route("/health/db", get(ready))
}
