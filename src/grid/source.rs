//! Where candidate measurements come from.

use std::future::Future;

use super::filter::FilterPipeline;
use super::reducer::Candidate;
use crate::error::ServiceResult;

// ---

/// A read-only view of the measurement corpus.
///
/// Implementations must apply every filter of the pipeline in one bulk
/// fetch; the engine never asks for measurements one at a time.
pub trait MeasurementSource {
    /// Ids of sessions carrying at least one of `tags`.
    fn sessions_tagged_with(
        &self,
        tags: &[String],
    ) -> impl Future<Output = ServiceResult<Vec<i64>>> + Send;

    /// Every measurement selected by `pipeline`.
    fn fetch_candidates(
        &self,
        pipeline: &FilterPipeline,
    ) -> impl Future<Output = ServiceResult<Vec<Candidate>>> + Send;
}
