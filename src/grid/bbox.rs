//! Geographic bounding boxes, including boxes that wrap across ±180°.

use serde::Serialize;

use rust_decimal::Decimal;

use super::decimal::{overflow, to_f64};
use super::reducer::CellIndex;
use super::resolver::ExactGrid;
use crate::error::{ServiceError, ServiceResult};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl BoundingBox {
    // ---
    pub fn new(west: f64, east: f64, south: f64, north: f64) -> Self {
        Self {
            west,
            east,
            south,
            north,
        }
    }

    /// Reject non-finite or out-of-range corners and inverted latitudes.
    pub fn validate(&self) -> ServiceResult<()> {
        // ---
        for (name, value, limit) in [
            ("west", self.west, 180.0),
            ("east", self.east, 180.0),
            ("south", self.south, 90.0),
            ("north", self.north, 90.0),
        ] {
            if !value.is_finite() || value.abs() > limit {
                return Err(ServiceError::invalid(format!(
                    "{name} must be within [-{limit}, {limit}], got {value}"
                )));
            }
        }
        if self.south > self.north {
            return Err(ServiceError::invalid(format!(
                "south {} must not exceed north {}",
                self.south, self.north
            )));
        }
        Ok(())
    }

    /// A box whose west edge is not left of its east edge wraps the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west >= self.east
    }

    /// Angular width in degrees, measured eastwards from `west` to `east`.
    pub fn longitude_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            (180.0 - self.west) + (180.0 + self.east)
        } else {
            self.east - self.west
        }
    }

    pub fn contains_longitude(&self, longitude: f64) -> bool {
        if self.crosses_antimeridian() {
            // [west, 180] or [-180, east]
            longitude >= self.west || longitude <= self.east
        } else {
            self.west <= longitude && longitude <= self.east
        }
    }

    pub fn contains_latitude(&self, latitude: f64) -> bool {
        self.south <= latitude && latitude <= self.north
    }

    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.contains_longitude(longitude) && self.contains_latitude(latitude)
    }

    /// Degree-space extent of a grid cell; the inverse of
    /// [`CellIndex::of`] under the same resolution.
    pub fn from_cell(cell: CellIndex, grid: &ExactGrid) -> ServiceResult<Self> {
        // ---
        let (west, east) = cell_edges(cell.middle_x, grid.grid_x)?;
        let (south, north) = cell_edges(cell.middle_y, grid.grid_y)?;
        Ok(Self {
            west,
            east,
            south,
            north,
        })
    }
}

fn cell_edges(middle: i64, size: Decimal) -> ServiceResult<(f64, f64)> {
    let center = Decimal::from(middle)
        .checked_mul(size)
        .ok_or_else(|| overflow("cell center"))?;
    let half = size / Decimal::TWO;
    let low = center.checked_sub(half).ok_or_else(|| overflow("cell edge"))?;
    let high = center.checked_add(half).ok_or_else(|| overflow("cell edge"))?;
    Ok((to_f64(low)?, to_f64(high)?))
}
