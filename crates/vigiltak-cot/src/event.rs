//! Cursor on Target event model.
//!
//! A CoT event is a timestamped position report with a type taxonomy
//! string and an open-ended detail section. This module keeps the detail
//! section as a flat string map so events survive decode, rebroadcast and
//! re-encode without the crate having to understand every detail schema
//! in the wild.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Circular/linear error value meaning "no estimate available".
pub const UNKNOWN_ACCURACY: f64 = 9_999_999.0;

/// CoT schema version emitted on every event this crate produces.
pub const COT_VERSION: &str = "2.0";

/// Geographic position in WGS-84 with accuracy estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in decimal degrees, positive north.
    pub lat: f64,
    /// Longitude in decimal degrees, positive east.
    pub lon: f64,
    /// Height above ellipsoid in meters.
    pub hae: f64,
    /// Circular (horizontal) error in meters.
    pub ce: f64,
    /// Linear (vertical) error in meters.
    pub le: f64,
}

impl Point {
    /// Position with unknown accuracy estimates.
    pub fn new(lat: f64, lon: f64, hae: f64) -> Self {
        Self {
            lat,
            lon,
            hae,
            ce: UNKNOWN_ACCURACY,
            le: UNKNOWN_ACCURACY,
        }
    }

    pub fn with_accuracy(mut self, ce: f64, le: f64) -> Self {
        self.ce = ce;
        self.le = le;
        self
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// A single Cursor on Target event.
///
/// Detail children are flattened into `detail` as dotted keys: the
/// attribute `callsign` of a `<contact>` child becomes the key
/// `contact.callsign`, while a child element carrying only text (for
/// example `<remarks>`) becomes the bare key `remarks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotEvent {
    pub version: String,
    pub uid: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub how: String,
    pub time: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub stale: DateTime<Utc>,
    pub point: Point,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
}

impl CotEvent {
    /// New event valid from now until `stale_after` from now.
    pub fn new(
        uid: impl Into<String>,
        event_type: impl Into<String>,
        how: impl Into<String>,
        point: Point,
        stale_after: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: COT_VERSION.to_string(),
            uid: uid.into(),
            event_type: event_type.into(),
            how: how.into(),
            time: now,
            start: now,
            stale: now + stale_after,
            point,
            detail: BTreeMap::new(),
        }
    }

    /// Adds one detail entry, replacing any previous value for the key.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    /// Replaces all three timestamps from epoch milliseconds.
    pub fn with_millis_timestamps(mut self, time: u64, start: u64, stale: u64) -> Self {
        self.time = millis_to_datetime(time);
        self.start = millis_to_datetime(start);
        self.stale = millis_to_datetime(stale);
        self
    }

    /// Event time as epoch milliseconds.
    pub fn time_millis(&self) -> u64 {
        datetime_to_millis(self.time)
    }

    /// Start time as epoch milliseconds.
    pub fn start_millis(&self) -> u64 {
        datetime_to_millis(self.start)
    }

    /// Stale time as epoch milliseconds. Track retention keys off this.
    pub fn stale_millis(&self) -> u64 {
        datetime_to_millis(self.stale)
    }

    /// Callsign from the contact detail, if present.
    pub fn callsign(&self) -> Option<&str> {
        self.detail.get("contact.callsign").map(String::as_str)
    }

    /// Network endpoint from the contact detail, if present.
    pub fn endpoint(&self) -> Option<&str> {
        self.detail.get("contact.endpoint").map(String::as_str)
    }

    /// Group (team) name from the detail, if present.
    pub fn group_name(&self) -> Option<&str> {
        self.detail.get("__group.name").map(String::as_str)
    }
}

/// Converts epoch milliseconds to a UTC datetime, clamping out-of-range
/// values instead of panicking on hostile input.
pub fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Converts a UTC datetime to epoch milliseconds. Pre-epoch times map
/// to zero so the subtraction cannot underflow.
pub fn datetime_to_millis(dt: DateTime<Utc>) -> u64 {
    dt.timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_defaults_to_unknown_accuracy() {
        let p = Point::new(-27.47, 153.02, 10.0);
        assert_eq!(p.ce, UNKNOWN_ACCURACY);
        assert_eq!(p.le, UNKNOWN_ACCURACY);
    }

    #[test]
    fn point_with_accuracy_overrides_defaults() {
        let p = Point::new(0.0, 0.0, 0.0).with_accuracy(10.0, 25.0);
        assert_eq!(p.ce, 10.0);
        assert_eq!(p.le, 25.0);
    }

    #[test]
    fn new_event_has_consistent_timestamps() {
        let e = CotEvent::new(
            "TEST-1",
            "a-f-G",
            "m-g",
            Point::default(),
            Duration::seconds(20),
        );
        assert_eq!(e.version, COT_VERSION);
        assert_eq!(e.time, e.start);
        assert_eq!(e.stale - e.start, Duration::seconds(20));
    }

    #[test]
    fn millis_round_trip() {
        let ms = 1_700_000_000_123u64;
        assert_eq!(datetime_to_millis(millis_to_datetime(ms)), ms);
    }

    #[test]
    fn with_millis_timestamps_replaces_all_three() {
        let e = CotEvent::new("u", "t", "h", Point::default(), Duration::seconds(1))
            .with_millis_timestamps(1_000, 2_000, 3_000);
        assert_eq!(e.time_millis(), 1_000);
        assert_eq!(e.start_millis(), 2_000);
        assert_eq!(e.stale_millis(), 3_000);
    }

    #[test]
    fn detail_accessors_read_dotted_keys() {
        let e = CotEvent::new("u", "t", "h", Point::default(), Duration::seconds(1))
            .with_detail("contact.callsign", "VIKING1")
            .with_detail("contact.endpoint", "192.168.1.10:4242:tcp")
            .with_detail("__group.name", "Alpha");
        assert_eq!(e.callsign(), Some("VIKING1"));
        assert_eq!(e.endpoint(), Some("192.168.1.10:4242:tcp"));
        assert_eq!(e.group_name(), Some("Alpha"));
    }
}
