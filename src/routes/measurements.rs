//! `POST /api/measurements`: store one measurement for an existing stream.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Measurement, NewMeasurement, RawMeasurement};
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new().route("/api/measurements", post(handler))
}

async fn handler(
    State((pool, _config)): State<(PgPool, Config)>,
    Json(raw): Json<RawMeasurement>,
) -> ServiceResult<(StatusCode, Json<Measurement>)> {
    // ---
    debug!("POST /api/measurements - {:?}", raw);

    let new = raw.to_validated()?;
    let stored = store_measurement(&pool, &new).await?;

    info!(
        "Stored measurement {} for stream {}",
        stored.id, stored.stream_id
    );
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Insert a measurement and bump its stream's cached count in one transaction.
async fn store_measurement(pool: &PgPool, new: &NewMeasurement) -> ServiceResult<Measurement> {
    // ---
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE streams
        SET measurements_count = measurements_count + 1
        WHERE id = $1
        "#,
    )
    .bind(new.stream_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        // Dropping `tx` rolls back
        return Err(ServiceError::not_found(format!("stream {}", new.stream_id)));
    }

    let stored = sqlx::query_as::<_, Measurement>(
        r#"
        INSERT INTO measurements (
            stream_id, value, latitude, longitude, time, timezone_offset
        ) VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, stream_id, value, latitude, longitude, time, timezone_offset
        "#,
    )
    .bind(new.stream_id)
    .bind(new.value)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(new.time)
    .bind(new.timezone_offset)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(stored)
}
