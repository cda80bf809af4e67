//! Exact decimal conversions for cell bucketing.
//!
//! Coordinates and cell sizes are taken at their shortest round-trip
//! decimal form, so `0.15` divided by `0.1` is exactly `1.5`. Results go
//! back to `f64` through a correctly rounded parse, which keeps the
//! ordering of decimal values intact.

use rust_decimal::Decimal;

use crate::error::{ServiceError, ServiceResult};

// ---

pub fn to_decimal(name: &str, value: f64) -> ServiceResult<Decimal> {
    // ---
    value
        .to_string()
        .parse::<Decimal>()
        .map_err(|e| ServiceError::invalid(format!("{name} {value} has no decimal form: {e}")))
}

pub fn to_f64(value: Decimal) -> ServiceResult<f64> {
    value
        .to_string()
        .parse::<f64>()
        .map_err(|e| ServiceError::invalid(format!("{value} has no f64 form: {e}")))
}

pub fn overflow(what: &str) -> ServiceError {
    ServiceError::invalid(format!("{what} overflows exact cell arithmetic"))
}
