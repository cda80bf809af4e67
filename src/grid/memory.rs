//! In-memory measurement source.
//!
//! Holds a snapshot of users, sessions, streams, measurements and tags and
//! evaluates the filter pipeline in process. Useful for fixtures and for
//! serving small, pre-loaded datasets.

use std::collections::{BTreeMap, BTreeSet};

use super::filter::{FilterPipeline, JoinedMeasurement};
use super::reducer::Candidate;
use super::source::MeasurementSource;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Measurement, NewMeasurement, Session, Stream, User};

// ---

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    users: BTreeMap<i64, User>,
    sessions: BTreeMap<i64, Session>,
    streams: BTreeMap<i64, Stream>,
    measurements: Vec<Measurement>,
    /// Tag name to the sessions carrying it.
    tags: BTreeMap<String, BTreeSet<i64>>,
}

impl MemorySource {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, username: &str) -> i64 {
        // ---
        let id = next_id(&self.users);
        self.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
            },
        );
        id
    }

    pub fn add_session(
        &mut self,
        user_id: i64,
        title: &str,
        contribute: bool,
        tags: &[&str],
    ) -> ServiceResult<i64> {
        // ---
        if !self.users.contains_key(&user_id) {
            return Err(ServiceError::not_found(format!("user {user_id}")));
        }

        let id = next_id(&self.sessions);
        self.sessions.insert(
            id,
            Session {
                id,
                user_id,
                title: title.to_string(),
                contribute,
            },
        );
        for tag in tags {
            self.tags.entry(tag.to_string()).or_default().insert(id);
        }
        Ok(id)
    }

    pub fn add_stream(
        &mut self,
        session_id: i64,
        measurement_type: &str,
        sensor_name: &str,
    ) -> ServiceResult<i64> {
        // ---
        if !self.sessions.contains_key(&session_id) {
            return Err(ServiceError::not_found(format!("session {session_id}")));
        }

        let id = next_id(&self.streams);
        self.streams.insert(
            id,
            Stream {
                id,
                session_id,
                measurement_type: measurement_type.to_string(),
                sensor_name: sensor_name.to_string(),
                measurements_count: 0,
            },
        );
        Ok(id)
    }

    /// Store a validated measurement and bump its stream's counter.
    pub fn add_measurement(&mut self, new: NewMeasurement) -> ServiceResult<Measurement> {
        // ---
        let stream = self
            .streams
            .get_mut(&new.stream_id)
            .ok_or_else(|| ServiceError::not_found(format!("stream {}", new.stream_id)))?;
        stream.measurements_count += 1;

        let measurement = Measurement {
            id: self.measurements.len() as i64 + 1,
            stream_id: new.stream_id,
            value: new.value,
            latitude: new.latitude,
            longitude: new.longitude,
            time: new.time,
            timezone_offset: new.timezone_offset,
        };
        self.measurements.push(measurement.clone());
        Ok(measurement)
    }

    pub fn stream(&self, id: i64) -> Option<&Stream> {
        self.streams.get(&id)
    }

    fn join<'a>(&'a self, measurement: &'a Measurement) -> Option<JoinedMeasurement<'a>> {
        let stream = self.streams.get(&measurement.stream_id)?;
        let session = self.sessions.get(&stream.session_id)?;
        let user = self.users.get(&session.user_id)?;
        Some(JoinedMeasurement {
            measurement,
            stream,
            session,
            user,
        })
    }
}

fn next_id<V>(table: &BTreeMap<i64, V>) -> i64 {
    table.keys().next_back().map_or(1, |last| last + 1)
}

impl MeasurementSource for MemorySource {
    // ---
    async fn sessions_tagged_with(&self, tags: &[String]) -> ServiceResult<Vec<i64>> {
        // ---
        let ids: BTreeSet<i64> = tags
            .iter()
            .filter_map(|tag| self.tags.get(tag))
            .flatten()
            .copied()
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn fetch_candidates(&self, pipeline: &FilterPipeline) -> ServiceResult<Vec<Candidate>> {
        // ---
        let candidates = self
            .measurements
            .iter()
            .filter_map(|m| self.join(m))
            .filter(|row| pipeline.matches(row))
            .map(|row| Candidate {
                value: row.measurement.value,
                latitude: row.measurement.latitude,
                longitude: row.measurement.longitude,
                session_id: row.session.id,
            })
            .collect();
        Ok(candidates)
    }
}
