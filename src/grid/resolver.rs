//! Turns a requested grid size into concrete cell dimensions.
//!
//! Cell heights are never arbitrary: they are picked from a fixed geometric
//! progression so that requests at similar zoom levels share the same grid.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use super::bbox::BoundingBox;
use super::decimal::to_decimal;
use crate::error::{ServiceError, ServiceResult};

// ---

const Y_SIZE_COUNT: usize = 300;
const Y_SIZE_RATIO: f64 = 1.2;
const Y_SIZE_SCALE: f64 = 0.000001;

/// Largest cell index magnitude; every index up to it is an exact `f64`.
pub const MAX_CELL_INDEX: u64 = 1 << 53;

/// Allowed latitude cell heights, `1.2^i * 1e-6` for `i` in `1..=300`.
pub static Y_SIZES: Lazy<[f64; Y_SIZE_COUNT]> = Lazy::new(|| {
    let mut sizes = [0.0; Y_SIZE_COUNT];
    for (i, size) in sizes.iter_mut().enumerate() {
        *size = Y_SIZE_RATIO.powi(i as i32 + 1) * Y_SIZE_SCALE;
    }
    sizes
});

/// Cell width (`grid_x`) and height (`grid_y`) in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridResolution {
    pub grid_x: f64,
    pub grid_y: f64,
}

/// Resolve the cell dimensions for `bbox` divided by the requested sizes.
pub fn resolve(
    bbox: &BoundingBox,
    grid_size_x: f64,
    grid_size_y: f64,
) -> ServiceResult<GridResolution> {
    // ---
    require_positive("grid_size_x", grid_size_x)?;
    require_positive("grid_size_y", grid_size_y)?;

    let grid_x = bbox.longitude_span() / grid_size_x;
    let raw_y = (bbox.north - bbox.south) / grid_size_y;
    let grid_y = quantize_y(raw_y)?;

    if !(grid_x > 0.0 && grid_x.is_finite()) || 180.0 / grid_x > MAX_CELL_INDEX as f64 {
        return Err(ServiceError::invalid(format!(
            "grid_size_x {grid_size_x} gives unusable cell width {grid_x}"
        )));
    }

    Ok(GridResolution { grid_x, grid_y })
}

/// Cell dimensions in exact decimal form, as used for bucketing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExactGrid {
    pub grid_x: Decimal,
    pub grid_y: Decimal,
}

impl GridResolution {
    pub fn exact(&self) -> ServiceResult<ExactGrid> {
        Ok(ExactGrid {
            grid_x: to_decimal("grid_x", self.grid_x)?,
            grid_y: to_decimal("grid_y", self.grid_y)?,
        })
    }
}

/// Smallest allowed cell height strictly greater than `raw_y`.
pub fn quantize_y(raw_y: f64) -> ServiceResult<f64> {
    // ---
    if raw_y.is_nan() {
        return Err(ServiceError::invalid("latitude cell height is not a number"));
    }

    // Y_SIZES is ascending, so the first index past raw_y is the answer.
    let idx = Y_SIZES.partition_point(|&size| size <= raw_y);
    Y_SIZES
        .get(idx)
        .copied()
        .ok_or(ServiceError::ResolutionTooCoarse { raw_y })
}

fn require_positive(name: &str, value: f64) -> ServiceResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ServiceError::invalid(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}
