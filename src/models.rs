//! Data models for measurements, their owners and the averages query surface.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

// ---

const SECONDS_IN_MINUTE: i32 = 60;

/// Accepted layouts for recorded timestamps that carry no UTC offset.
const NAIVE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// Only contributed sessions take part in aggregation.
    pub contribute: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Stream {
    pub id: i64,
    pub session_id: i64,
    pub measurement_type: String,
    pub sensor_name: String,
    pub measurements_count: i64,
}

/// Stored measurement. `time` is the device-local wall clock time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Measurement {
    pub id: i64,
    pub stream_id: i64,
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub time: NaiveDateTime,
    pub timezone_offset: i32,
}

/// Measurement as posted by a device, before validation.
#[derive(Debug, Deserialize)]
pub struct RawMeasurement {
    pub stream_id: Option<i64>,
    pub value: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time: Option<String>,
}

/// Validated measurement ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub stream_id: i64,
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub time: NaiveDateTime,
    pub timezone_offset: i32,
}

impl RawMeasurement {
    // ---
    /// Check required fields and derive the local time and timezone offset.
    pub fn to_validated(&self) -> ServiceResult<NewMeasurement> {
        // ---
        let stream_id = require(self.stream_id, "stream_id")?;
        let value = require_finite(self.value, "value")?;
        let latitude = require_finite(self.latitude, "latitude")?;
        let longitude = require_finite(self.longitude, "longitude")?;
        let raw_time = self
            .time
            .as_deref()
            .ok_or_else(|| ServiceError::invalid("time is required"))?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ServiceError::invalid(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ServiceError::invalid(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }

        let (time, timezone_offset) = parse_recorded_time(raw_time)?;

        Ok(NewMeasurement {
            stream_id,
            value,
            latitude,
            longitude,
            time,
            timezone_offset,
        })
    }
}

fn require<T>(field: Option<T>, name: &str) -> ServiceResult<T> {
    field.ok_or_else(|| ServiceError::invalid(format!("{name} is required")))
}

fn require_finite(field: Option<f64>, name: &str) -> ServiceResult<f64> {
    let value = require(field, name)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ServiceError::invalid(format!("{name} must be a finite number")))
    }
}

/// Split a recorded timestamp into local wall clock time and its offset
/// from UTC in minutes. Timestamps without an offset are taken as UTC.
pub fn parse_recorded_time(raw: &str) -> ServiceResult<(NaiveDateTime, i32)> {
    // ---
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok((
            with_offset.naive_local(),
            timezone_offset_minutes(&with_offset),
        ));
    }

    NAIVE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| (naive, 0))
        .ok_or_else(|| ServiceError::invalid(format!("unrecognised time '{raw}'")))
}

/// Offset from UTC in whole minutes, east positive.
pub fn timezone_offset_minutes(recorded: &DateTime<chrono::FixedOffset>) -> i32 {
    recorded.offset().local_minus_utc() / SECONDS_IN_MINUTE
}

/// Split a comma or whitespace separated list, dropping empty entries.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Everything a grid-averages request can ask for.
#[derive(Debug, Clone, Default)]
pub struct AveragesQuery {
    pub measurement_type: String,
    pub sensor_name: String,
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
    pub grid_size_x: f64,
    pub grid_size_y: f64,
    /// Minutes since local midnight.
    pub time_from: Option<i32>,
    pub time_to: Option<i32>,
    pub day_from: Option<i32>,
    pub day_to: Option<i32>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub tags: Vec<String>,
    pub usernames: Vec<String>,
}

/// One occupied grid cell in an averages response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellAverage {
    /// Distinct contributing session ids, ascending.
    pub ids: Vec<i64>,
    pub value: f64,
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Datelike, NaiveDate, Timelike};

    fn create_raw_measurement(time: &str) -> RawMeasurement {
        // ---
        RawMeasurement {
            stream_id: Some(7),
            value: Some(42.5),
            latitude: Some(40.7),
            longitude: Some(-73.9),
            time: Some(time.to_string()),
        }
    }

    #[test]
    fn test_offset_is_derived_from_recorded_time() {
        // ---
        let raw = create_raw_measurement("2014-05-01T10:30:00+02:00");
        let new = raw.to_validated().unwrap();

        // Wall clock time is kept as recorded, not shifted to UTC
        assert_eq!(new.time.hour(), 10);
        assert_eq!(new.time.minute(), 30);
        assert_eq!(new.timezone_offset, 120);
    }

    #[test]
    fn test_negative_and_fractional_offsets() {
        // ---
        let (_, west) = parse_recorded_time("2014-05-01T10:30:00-05:00").unwrap();
        assert_eq!(west, -300);

        let (_, india) = parse_recorded_time("2014-05-01T10:30:00+05:30").unwrap();
        assert_eq!(india, 330);
    }

    #[test]
    fn test_time_without_offset_is_utc() {
        // ---
        let (time, offset) = parse_recorded_time("2015-12-31T23:59:00").unwrap();
        assert_eq!(offset, 0);
        assert_eq!(time.year(), 2015);
        assert_eq!(time.ordinal(), 365);

        let (spaced, _) = parse_recorded_time("2015-01-02 08:00:00").unwrap();
        assert_eq!(
            spaced,
            NaiveDate::from_ymd_opt(2015, 1, 2)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        // ---
        let mut raw = create_raw_measurement("2014-05-01T10:30:00Z");
        raw.value = None;
        let err = raw.to_validated().unwrap_err();
        assert_eq!(err.to_string(), "invalid input: value is required");

        let mut raw = create_raw_measurement("2014-05-01T10:30:00Z");
        raw.stream_id = None;
        assert!(raw.to_validated().is_err());

        let mut raw = create_raw_measurement("2014-05-01T10:30:00Z");
        raw.time = None;
        assert!(raw.to_validated().is_err());
    }

    #[test]
    fn test_malformed_fields_are_rejected() {
        // ---
        let mut raw = create_raw_measurement("2014-05-01T10:30:00Z");
        raw.latitude = Some(95.0);
        assert!(raw.to_validated().is_err());

        let mut raw = create_raw_measurement("2014-05-01T10:30:00Z");
        raw.value = Some(f64::NAN);
        assert!(raw.to_validated().is_err());

        let raw = create_raw_measurement("yesterday");
        assert!(raw.to_validated().is_err());
    }

    #[test]
    fn test_split_list() {
        // ---
        assert_eq!(split_list(Some("asthma, school")), vec!["asthma", "school"]);
        assert_eq!(split_list(Some(" a  b,c,,")), vec!["a", "b", "c"]);
        assert!(split_list(Some(" , ")).is_empty());
        assert!(split_list(None).is_empty());
    }
}
