//! Route gateway (EMBP): merges every subrouter and attaches shared state.

use axum::Router;
use sqlx::PgPool;

use crate::Config;

mod averages;
mod health;
mod measurements;

// ---

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(averages::router())
        .merge(measurements::router())
        .merge(health::router())
        .with_state((pool, config))
}
