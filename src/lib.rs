//! Grid-averaging service for geotagged sensor measurements.
//!
//! Measurements are recorded by sensors in the field, grouped into streams
//! and sessions, and queried back as a coarse grid of averaged cells for
//! map heat layers. The aggregation engine lives in [`grid`]; the HTTP
//! surface in [`routes`] wires it to PostgreSQL.
//!
//! Modules follow the Explicit Module Boundary Pattern (EMBP): each one
//! exposes a small gateway and keeps its helpers private.

pub mod config;
pub mod error;
pub mod grid;
pub mod models;
pub mod routes;
pub mod schema;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use models::{AveragesQuery, CellAverage};
