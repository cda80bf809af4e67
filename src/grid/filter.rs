//! Composable measurement filters.
//!
//! Each [`Filter`] can render itself into the `WHERE` clause of the bulk
//! fetch and can also be evaluated against an in-memory joined row, so both
//! data sources share one definition of what a query selects. A
//! [`FilterPipeline`] is the conjunction of its filters.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use sqlx::{Postgres, QueryBuilder};

use super::bbox::BoundingBox;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{AveragesQuery, Measurement, Session, Stream, User};

// ---

/// A measurement joined to its stream, session and user.
#[derive(Debug, Clone, Copy)]
pub struct JoinedMeasurement<'a> {
    pub measurement: &'a Measurement,
    pub stream: &'a Stream,
    pub session: &'a Session,
    pub user: &'a User,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Session is marked as contributed.
    Contributing,
    Stream {
        measurement_type: String,
        sensor_name: String,
    },
    Area(BoundingBox),
    /// Minutes since local midnight, inclusive. Ranges do not wrap midnight.
    TimeOfDay { from: i32, to: i32 },
    /// Day of year (1-366), inclusive.
    DayOfYear { from: i32, to: i32 },
    /// Half-open local time interval `[from, until)`.
    Years {
        from: NaiveDateTime,
        until: NaiveDateTime,
    },
    /// Session ids resolved from the requested tags.
    Sessions(BTreeSet<i64>),
    Usernames(Vec<String>),
}

impl Filter {
    // ---
    /// Append this filter's condition to a query whose measurement, stream,
    /// session and user tables are aliased `m`, `st`, `s` and `u`.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        // ---
        match self {
            Filter::Contributing => {
                qb.push("s.contribute = TRUE");
            }
            Filter::Stream {
                measurement_type,
                sensor_name,
            } => {
                qb.push("st.measurement_type = ")
                    .push_bind(measurement_type.clone())
                    .push(" AND st.sensor_name = ")
                    .push_bind(sensor_name.clone());
            }
            Filter::Area(bbox) => {
                if bbox.crosses_antimeridian() {
                    qb.push("(m.longitude >= ")
                        .push_bind(bbox.west)
                        .push(" OR m.longitude <= ")
                        .push_bind(bbox.east)
                        .push(")");
                } else {
                    qb.push("m.longitude BETWEEN ")
                        .push_bind(bbox.west)
                        .push(" AND ")
                        .push_bind(bbox.east);
                }
                qb.push(" AND m.latitude BETWEEN ")
                    .push_bind(bbox.south)
                    .push(" AND ")
                    .push_bind(bbox.north);
            }
            Filter::TimeOfDay { from, to } => {
                qb.push(
                    "(EXTRACT(HOUR FROM m.time)::int * 60 + EXTRACT(MINUTE FROM m.time)::int) BETWEEN ",
                )
                .push_bind(*from)
                .push(" AND ")
                .push_bind(*to);
            }
            Filter::DayOfYear { from, to } => {
                qb.push("EXTRACT(DOY FROM m.time)::int BETWEEN ")
                    .push_bind(*from)
                    .push(" AND ")
                    .push_bind(*to);
            }
            Filter::Years { from, until } => {
                qb.push("m.time >= ")
                    .push_bind(*from)
                    .push(" AND m.time < ")
                    .push_bind(*until);
            }
            Filter::Sessions(ids) => {
                qb.push("s.id = ANY(")
                    .push_bind(ids.iter().copied().collect::<Vec<i64>>())
                    .push(")");
            }
            Filter::Usernames(names) => {
                qb.push("u.username = ANY(").push_bind(names.clone()).push(")");
            }
        }
    }

    pub fn matches(&self, row: &JoinedMeasurement<'_>) -> bool {
        // ---
        let m = row.measurement;
        match self {
            Filter::Contributing => row.session.contribute,
            Filter::Stream {
                measurement_type,
                sensor_name,
            } => {
                row.stream.measurement_type == *measurement_type
                    && row.stream.sensor_name == *sensor_name
            }
            Filter::Area(bbox) => bbox.contains(m.longitude, m.latitude),
            Filter::TimeOfDay { from, to } => {
                let minutes = (m.time.hour() * 60 + m.time.minute()) as i32;
                (*from..=*to).contains(&minutes)
            }
            Filter::DayOfYear { from, to } => (*from..=*to).contains(&(m.time.ordinal() as i32)),
            Filter::Years { from, until } => *from <= m.time && m.time < *until,
            Filter::Sessions(ids) => ids.contains(&row.session.id),
            Filter::Usernames(names) => names.iter().any(|n| *n == row.user.username),
        }
    }
}

/// Conjunction of filters, cheapest and most selective first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPipeline {
    filters: Vec<Filter>,
}

impl FilterPipeline {
    // ---
    /// Build the pipeline for `query`. `tagged_sessions` is the already
    /// resolved tag restriction, if the query named any tags.
    pub fn build(query: &AveragesQuery, tagged_sessions: Option<Vec<i64>>) -> ServiceResult<Self> {
        // ---
        let mut filters = vec![
            Filter::Contributing,
            Filter::Stream {
                measurement_type: query.measurement_type.clone(),
                sensor_name: query.sensor_name.clone(),
            },
            Filter::Area(BoundingBox::new(
                query.west,
                query.east,
                query.south,
                query.north,
            )),
        ];

        if let Some((from, to)) = both("time", query.time_from, query.time_to) {
            filters.push(Filter::TimeOfDay { from, to });
        }
        if let Some((from, to)) = both("day", query.day_from, query.day_to) {
            filters.push(Filter::DayOfYear { from, to });
        }
        if let Some((year_from, year_to)) = both("year", query.year_from, query.year_to) {
            filters.push(Filter::Years {
                from: start_of_year(year_from)?,
                until: start_of_year(year_to.saturating_add(1))?,
            });
        }
        if let Some(ids) = tagged_sessions {
            filters.push(Filter::Sessions(ids.into_iter().collect()));
        }
        if !query.usernames.is_empty() {
            filters.push(Filter::Usernames(query.usernames.clone()));
        }

        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn matches(&self, row: &JoinedMeasurement<'_>) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Append every filter to `qb` as `AND`-ed conditions.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for filter in &self.filters {
            qb.push(" AND ");
            filter.push_sql(qb);
        }
    }
}

/// Paired range bounds only apply when both ends are given.
fn both(name: &str, from: Option<i32>, to: Option<i32>) -> Option<(i32, i32)> {
    // ---
    if from.is_some() != to.is_some() {
        tracing::debug!(
            "Skipping {} filter: only one bound given ({:?}..{:?})",
            name,
            from,
            to
        );
    }
    from.zip(to)
}

fn start_of_year(year: i32) -> ServiceResult<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ServiceError::invalid(format!("year {year} is out of range")))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    struct Fixture {
        measurement: Measurement,
        stream: Stream,
        session: Session,
        user: User,
    }

    impl Fixture {
        fn new(longitude: f64, latitude: f64, time: &str) -> Self {
            // ---
            Fixture {
                measurement: Measurement {
                    id: 1,
                    stream_id: 10,
                    value: 12.0,
                    latitude,
                    longitude,
                    time: NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M").unwrap(),
                    timezone_offset: 0,
                },
                stream: Stream {
                    id: 10,
                    session_id: 100,
                    measurement_type: "Particulate Matter".to_string(),
                    sensor_name: "AirBeam-PM".to_string(),
                    measurements_count: 1,
                },
                session: Session {
                    id: 100,
                    user_id: 1000,
                    title: "Commute".to_string(),
                    contribute: true,
                },
                user: User {
                    id: 1000,
                    username: "maria".to_string(),
                },
            }
        }

        fn row(&self) -> JoinedMeasurement<'_> {
            JoinedMeasurement {
                measurement: &self.measurement,
                stream: &self.stream,
                session: &self.session,
                user: &self.user,
            }
        }
    }

    fn base_query() -> AveragesQuery {
        AveragesQuery {
            measurement_type: "Particulate Matter".to_string(),
            sensor_name: "AirBeam-PM".to_string(),
            west: -10.0,
            east: 10.0,
            south: -10.0,
            north: 10.0,
            grid_size_x: 2.0,
            grid_size_y: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_required_filters_always_present() {
        // ---
        let pipeline = FilterPipeline::build(&base_query(), None).unwrap();
        assert_eq!(pipeline.filters().len(), 3);
        assert_eq!(pipeline.filters()[0], Filter::Contributing);
    }

    #[test]
    fn test_non_contributing_session_is_rejected() {
        // ---
        let pipeline = FilterPipeline::build(&base_query(), None).unwrap();
        let mut fixture = Fixture::new(1.0, 1.0, "2015-06-01 12:00");
        assert!(pipeline.matches(&fixture.row()));

        fixture.session.contribute = false;
        assert!(!pipeline.matches(&fixture.row()));
    }

    #[test]
    fn test_stream_must_match_exactly() {
        // ---
        let pipeline = FilterPipeline::build(&base_query(), None).unwrap();
        let mut fixture = Fixture::new(1.0, 1.0, "2015-06-01 12:00");
        fixture.stream.sensor_name = "AirBeam-pm".to_string();
        assert!(!pipeline.matches(&fixture.row()));
    }

    #[test]
    fn test_area_across_antimeridian() {
        // ---
        let mut query = base_query();
        query.west = 170.0;
        query.east = -170.0;
        let pipeline = FilterPipeline::build(&query, None).unwrap();

        assert!(pipeline.matches(&Fixture::new(175.0, 0.0, "2015-06-01 12:00").row()));
        assert!(pipeline.matches(&Fixture::new(-175.0, 0.0, "2015-06-01 12:00").row()));
        assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, "2015-06-01 12:00").row()));
    }

    #[test]
    fn test_time_of_day_is_inclusive() {
        // ---
        let mut query = base_query();
        query.time_from = Some(8 * 60);
        query.time_to = Some(9 * 60);
        let pipeline = FilterPipeline::build(&query, None).unwrap();

        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2015-06-01 08:00").row()));
        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2015-06-01 09:00").row()));
        assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, "2015-06-01 09:01").row()));
    }

    #[test]
    fn test_time_of_day_does_not_wrap_midnight() {
        // ---
        let mut query = base_query();
        query.time_from = Some(1380);
        query.time_to = Some(60);
        let pipeline = FilterPipeline::build(&query, None).unwrap();

        for time in ["2015-06-01 23:30", "2015-06-01 00:30", "2015-06-01 12:00"] {
            assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, time).row()));
        }
    }

    #[test]
    fn test_one_sided_bounds_are_skipped() {
        // ---
        let mut query = base_query();
        query.time_from = Some(600);
        query.day_to = Some(10);
        query.year_from = Some(2015);
        let pipeline = FilterPipeline::build(&query, None).unwrap();

        assert_eq!(pipeline.filters().len(), 3);
        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2012-12-31 01:00").row()));
    }

    #[test]
    fn test_day_of_year() {
        // ---
        let mut query = base_query();
        query.day_from = Some(32);
        query.day_to = Some(59);
        let pipeline = FilterPipeline::build(&query, None).unwrap();

        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2015-02-01 00:00").row()));
        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2015-02-28 23:59").row()));
        assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, "2015-03-01 00:00").row()));
    }

    #[test]
    fn test_year_range_covers_last_day() {
        // ---
        let mut query = base_query();
        query.year_from = Some(2014);
        query.year_to = Some(2015);
        let pipeline = FilterPipeline::build(&query, None).unwrap();

        assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, "2013-12-31 23:59").row()));
        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2014-01-01 00:00").row()));
        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2015-12-31 23:59").row()));
        assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, "2016-01-01 00:00").row()));
    }

    #[test]
    fn test_sessions_and_usernames() {
        // ---
        let mut query = base_query();
        query.usernames = vec!["maria".to_string(), "tom".to_string()];
        let pipeline = FilterPipeline::build(&query, Some(vec![7, 100])).unwrap();
        let mut fixture = Fixture::new(0.0, 0.0, "2015-06-01 12:00");
        assert!(pipeline.matches(&fixture.row()));

        fixture.user.username = "ann".to_string();
        assert!(!pipeline.matches(&fixture.row()));

        let pipeline = FilterPipeline::build(&base_query(), Some(vec![7])).unwrap();
        assert!(!pipeline.matches(&Fixture::new(0.0, 0.0, "2015-06-01 12:00").row()));
    }

    #[test]
    fn test_tagged_sessions_become_a_set() {
        // ---
        let ids: Vec<i64> = (0..5000).rev().chain([100, 100, 7]).collect();
        let pipeline = FilterPipeline::build(&base_query(), Some(ids)).unwrap();

        let Some(Filter::Sessions(set)) = pipeline.filters().last() else {
            panic!("expected a session filter last, got {:?}", pipeline.filters());
        };
        assert_eq!(set.len(), 5000);
        assert_eq!(set.first(), Some(&0));
        assert!(pipeline.matches(&Fixture::new(0.0, 0.0, "2015-06-01 12:00").row()));

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        pipeline.push_conditions(&mut qb);
        assert!(qb.sql().contains("s.id = ANY($7)"));
    }

    #[test]
    fn test_sql_rendering() {
        // ---
        let mut query = base_query();
        query.west = 170.0;
        query.east = -170.0;
        query.time_from = Some(0);
        query.time_to = Some(60);
        query.usernames = vec!["maria".to_string()];
        let pipeline = FilterPipeline::build(&query, Some(vec![1, 2])).unwrap();

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        pipeline.push_conditions(&mut qb);
        let sql = qb.sql();

        assert!(sql.contains("s.contribute = TRUE"));
        assert!(sql.contains("st.measurement_type = $1 AND st.sensor_name = $2"));
        assert!(sql.contains("(m.longitude >= $3 OR m.longitude <= $4)"));
        assert!(sql.contains("m.latitude BETWEEN $5 AND $6"));
        assert!(sql.contains("BETWEEN $7 AND $8"));
        assert!(sql.contains("s.id = ANY($9)"));
        assert!(sql.contains("u.username = ANY($10)"));
    }
}
