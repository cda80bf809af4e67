//! Buckets candidate measurements into grid cells and averages each cell.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::bbox::BoundingBox;
use super::decimal::{overflow, to_decimal};
use super::resolver::{ExactGrid, GridResolution, MAX_CELL_INDEX};
use crate::error::ServiceResult;
use crate::models::CellAverage;

// ---

/// The fields of a measurement the reducer needs once filtering is done.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Candidate {
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub session_id: i64,
}

/// Integer position of a cell on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex {
    pub middle_x: i64,
    pub middle_y: i64,
}

impl CellIndex {
    /// Cell containing the point. Halves round away from zero.
    ///
    /// Works on the decimal forms of the coordinate and cell size, so a
    /// point printed as lying on an edge is bucketed as lying on it.
    pub fn of(longitude: f64, latitude: f64, grid: &ExactGrid) -> ServiceResult<Self> {
        // ---
        Ok(Self {
            middle_x: axis_index("longitude", to_decimal("longitude", longitude)?, grid.grid_x)?,
            middle_y: axis_index("latitude", to_decimal("latitude", latitude)?, grid.grid_y)?,
        })
    }
}

/// `round(coord / size)` with halves away from zero, checked against the
/// exact cell edges `m * size ± size / 2`.
fn axis_index(name: &str, coord: Decimal, size: Decimal) -> ServiceResult<i64> {
    // ---
    let half = size / Decimal::TWO;
    let mut m = coord
        .checked_div(size)
        .ok_or_else(|| overflow(name))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    // The quotient carries at most 28 digits; settle ties on the edges themselves.
    let center = m.checked_mul(size).ok_or_else(|| overflow(name))?;
    let offset = coord.checked_sub(center).ok_or_else(|| overflow(name))?;
    if offset > half || (offset == half && m >= Decimal::ZERO) {
        m += Decimal::ONE;
    } else if offset < -half || (offset == -half && m <= Decimal::ZERO) {
        m -= Decimal::ONE;
    }

    if m.abs() > Decimal::from(MAX_CELL_INDEX) {
        return Err(overflow(name));
    }
    m.to_i64().ok_or_else(|| overflow(name))
}

#[derive(Debug, Default)]
struct CellAccumulator {
    sum: f64,
    count: u64,
    session_ids: BTreeSet<i64>,
}

impl CellAccumulator {
    fn add(&mut self, candidate: &Candidate) {
        self.sum += candidate.value;
        self.count += 1;
        self.session_ids.insert(candidate.session_id);
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Reduce candidates to one averaged row per occupied cell.
///
/// Rows come out ordered by cell index so repeated queries over the same
/// data return the same sequence, but callers should not rely on it.
pub fn reduce<'a, I>(candidates: I, grid: &GridResolution) -> ServiceResult<Vec<CellAverage>>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    // ---
    let exact = grid.exact()?;
    let mut cells: BTreeMap<CellIndex, CellAccumulator> = BTreeMap::new();
    for candidate in candidates {
        let cell = CellIndex::of(candidate.longitude, candidate.latitude, &exact)?;
        cells.entry(cell).or_default().add(candidate);
    }

    tracing::trace!("Reduced into {} occupied cells", cells.len());

    cells
        .into_iter()
        .map(|(cell, acc)| -> ServiceResult<CellAverage> {
            let bounds = BoundingBox::from_cell(cell, &exact)?;
            Ok(CellAverage {
                value: acc.mean(),
                ids: acc.session_ids.into_iter().collect(),
                west: bounds.west,
                east: bounds.east,
                south: bounds.south,
                north: bounds.north,
            })
        })
        .collect()
}
