//! Grid-averaging engine.
//!
//! Gateway for the aggregation core (EMBP): the resolver, filters, reducer
//! and data sources are internal siblings; callers only need
//! [`averages`], the [`MeasurementSource`] implementations and the query
//! and result types from `models`.
//!
//! A query runs in four steps:
//! - resolve the cell dimensions for the requested box and grid size
//! - resolve the tag filter, returning early when no session matches
//! - fetch every candidate in one filtered bulk read
//! - reduce the candidates to one averaged row per occupied cell

use crate::error::ServiceResult;
use crate::models::{AveragesQuery, CellAverage};

mod bbox;
mod decimal;
mod filter;
mod memory;
mod pg;
mod reducer;
mod resolver;
mod source;

pub use bbox::BoundingBox;
pub use filter::{Filter, FilterPipeline};
pub use memory::MemorySource;
pub use pg::PgSource;
pub use reducer::{Candidate, CellIndex};
pub use resolver::{resolve, ExactGrid, GridResolution, MAX_CELL_INDEX, Y_SIZES};
pub use source::MeasurementSource;

// ---

/// Average the measurements selected by `query` over a grid of cells.
#[tracing::instrument(
    skip(source, query),
    fields(
        measurement_type = %query.measurement_type,
        sensor_name = %query.sensor_name,
    )
)]
pub async fn averages<S>(source: &S, query: &AveragesQuery) -> ServiceResult<Vec<CellAverage>>
where
    S: MeasurementSource + Sync,
{
    // ---
    let bbox = BoundingBox::new(query.west, query.east, query.south, query.north);
    bbox.validate()?;
    let grid = resolve(&bbox, query.grid_size_x, query.grid_size_y)?;
    tracing::debug!("Resolved grid_x={} grid_y={}", grid.grid_x, grid.grid_y);

    let tagged_sessions = if query.tags.is_empty() {
        None
    } else {
        let ids = source.sessions_tagged_with(&query.tags).await?;
        if ids.is_empty() {
            tracing::debug!("No sessions tagged with {:?}, skipping fetch", query.tags);
            return Ok(Vec::new());
        }
        Some(ids)
    };

    let pipeline = FilterPipeline::build(query, tagged_sessions)?;
    let candidates = source.fetch_candidates(&pipeline).await?;
    let cells = reducer::reduce(&candidates, &grid)?;

    tracing::info!(
        "Averaged {} measurements into {} cells",
        candidates.len(),
        cells.len()
    );
    Ok(cells)
}
