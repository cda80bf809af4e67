//! Database schema management for `codemetal-heatgrid`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Statements run in order inside one transaction. Every statement is
/// idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id       BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id         BIGSERIAL PRIMARY KEY,
        user_id    BIGINT  NOT NULL REFERENCES users (id),
        title      TEXT    NOT NULL DEFAULT '',
        contribute BOOLEAN NOT NULL DEFAULT FALSE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS streams (
        id                 BIGSERIAL PRIMARY KEY,
        session_id         BIGINT NOT NULL REFERENCES sessions (id),
        measurement_type   TEXT   NOT NULL,
        sensor_name        TEXT   NOT NULL,
        measurements_count BIGINT NOT NULL DEFAULT 0
    );
    "#,
    // `time` is the device-local wall clock, hence no time zone.
    r#"
    CREATE TABLE IF NOT EXISTS measurements (
        id              BIGSERIAL PRIMARY KEY,
        stream_id       BIGINT           NOT NULL REFERENCES streams (id),
        value           DOUBLE PRECISION NOT NULL,
        latitude        DOUBLE PRECISION NOT NULL,
        longitude       DOUBLE PRECISION NOT NULL,
        time            TIMESTAMP        NOT NULL,
        timezone_offset INTEGER          NOT NULL DEFAULT 0
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id   BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS taggings (
        tag_id     BIGINT NOT NULL REFERENCES tags (id),
        session_id BIGINT NOT NULL REFERENCES sessions (id),
        PRIMARY KEY (tag_id, session_id)
    );
    "#,
    // Indexes backing the pushed-down filters
    r#"
    CREATE INDEX IF NOT EXISTS idx_streams_type_sensor
        ON streams (measurement_type, sensor_name);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_measurements_stream_id
        ON measurements (stream_id);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_measurements_lat_lng
        ON measurements (latitude, longitude);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_measurements_time
        ON measurements (time);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_taggings_session_id
        ON taggings (session_id);
    "#,
];

/// Create or update the database schema (idempotent).
///
/// Creates the user, session, stream, measurement and tag tables plus the
/// indexes used by the averages query. Safe to call on every startup.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Schema ready ({} statements applied)", SCHEMA.len());
    Ok(())
}
