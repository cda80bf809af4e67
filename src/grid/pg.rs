//! PostgreSQL-backed measurement source.

use sqlx::{PgPool, Postgres, QueryBuilder};

use super::filter::FilterPipeline;
use super::reducer::Candidate;
use super::source::MeasurementSource;
use crate::error::ServiceResult;

// ---

const CANDIDATES_SQL: &str = r#"
    SELECT m.value, m.latitude, m.longitude, s.id AS session_id
    FROM measurements m
    JOIN streams  st ON st.id = m.stream_id
    JOIN sessions s  ON s.id  = st.session_id
    JOIN users    u  ON u.id  = s.user_id
    WHERE TRUE"#;

#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MeasurementSource for PgSource {
    // ---
    async fn sessions_tagged_with(&self, tags: &[String]) -> ServiceResult<Vec<i64>> {
        // ---
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT tg.session_id
            FROM taggings tg
            JOIN tags t ON t.id = tg.tag_id
            WHERE t.name = ANY($1)
            "#,
        )
        .bind(tags.to_vec())
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Tags {:?} matched {} sessions", tags, ids.len());
        Ok(ids)
    }

    async fn fetch_candidates(&self, pipeline: &FilterPipeline) -> ServiceResult<Vec<Candidate>> {
        // ---
        let mut qb = QueryBuilder::<Postgres>::new(CANDIDATES_SQL);
        pipeline.push_conditions(&mut qb);

        let rows = qb
            .build_query_as::<Candidate>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("Fetched {} candidate measurements", rows.len());
        Ok(rows)
    }
}
