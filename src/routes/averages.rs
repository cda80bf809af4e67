//! `GET /api/averages`: grid-averaged measurements for a map viewport.

use axum::{extract::Query, extract::State, routing::get, Json, Router};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use crate::error::ServiceResult;
use crate::grid::{self, PgSource};
use crate::models::{split_list, AveragesQuery, CellAverage};
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new().route("/api/averages", get(handler))
}

async fn handler(
    Query(params): Query<AveragesParams>,
    State((pool, _config)): State<(PgPool, Config)>,
) -> ServiceResult<Json<Vec<CellAverage>>> {
    // ---
    info!("GET /api/averages - {:?}", params);

    let query = params.into_query();
    let source = PgSource::new(pool);
    let cells = grid::averages(&source, &query).await?;

    Ok(Json(cells))
}

/// Raw query string of an averages request.
///
/// `tags` and `usernames` are comma or whitespace separated lists.
#[derive(Debug, Deserialize)]
pub struct AveragesParams {
    measurement_type: String,
    sensor_name: String,
    west: f64,
    east: f64,
    south: f64,
    north: f64,
    grid_size_x: f64,
    grid_size_y: f64,
    time_from: Option<i32>,
    time_to: Option<i32>,
    day_from: Option<i32>,
    day_to: Option<i32>,
    year_from: Option<i32>,
    year_to: Option<i32>,
    tags: Option<String>,
    usernames: Option<String>,
}

impl AveragesParams {
    fn into_query(self) -> AveragesQuery {
        // ---
        AveragesQuery {
            tags: split_list(self.tags.as_deref()),
            usernames: split_list(self.usernames.as_deref()),
            measurement_type: self.measurement_type,
            sensor_name: self.sensor_name,
            west: self.west,
            east: self.east,
            south: self.south,
            north: self.north,
            grid_size_x: self.grid_size_x,
            grid_size_y: self.grid_size_y,
            time_from: self.time_from,
            time_to: self.time_to,
            day_from: self.day_from,
            day_to: self.day_to,
            year_from: self.year_from,
            year_to: self.year_to,
        }
    }
}
