//! Telemetry data model
//!
//! Mirrors the records served by the OpenF1 API: race sessions, the driver
//! roster of a session, and the location/position/lap point streams.
//!
//! Coordinate system: the telemetry feed's own planar system (x, y, z),
//! arbitrary units, NOT geographic coordinates.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Stable car number shared by every sample and roster entry
pub type CarNumber = u32;

/// Duration assumed when a session has no (or an inverted) end timestamp
pub const DEFAULT_SESSION_HOURS: i64 = 2;

/// One race event's telemetry window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_key: u32,

    #[serde(default)]
    pub meeting_key: u32,

    #[serde(default)]
    pub session_name: String,

    #[serde(default)]
    pub country_name: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub circuit_short_name: String,

    pub date_start: DateTime<Utc>,

    /// Absent for sessions the feed has not closed yet
    #[serde(default)]
    pub date_end: Option<DateTime<Utc>>,
}

impl Session {
    /// End of the session window, falling back to a 2 hour duration when the
    /// end is missing or precedes the start
    pub fn end(&self) -> DateTime<Utc> {
        match self.date_end {
            Some(end) if end >= self.date_start => end,
            _ => self.date_start + Duration::hours(DEFAULT_SESSION_HOURS),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end() - self.date_start
    }

    /// "Country • Location • Circuit" label for display
    pub fn label(&self) -> String {
        [
            self.country_name.as_str(),
            self.location.as_str(),
            self.circuit_short_name.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" • ")
    }
}

/// Roster entry for one car in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_number: CarNumber,

    #[serde(default)]
    pub name_acronym: String,

    #[serde(default)]
    pub full_name: String,

    #[serde(default)]
    pub team_name: String,

    /// Hex colour without the leading `#`
    #[serde(default)]
    pub team_colour: Option<String>,
}

impl Driver {
    /// CSS colour for this driver's dot
    pub fn colour(&self) -> String {
        match self.team_colour.as_deref() {
            Some(c) if !c.is_empty() => format!("#{}", c.trim_start_matches('#')),
            _ => "#111".to_string(),
        }
    }
}

/// Raw location sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub driver_number: CarNumber,
    pub date: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl LocationSample {
    pub fn point(&self) -> TrackPoint {
        TrackPoint::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Race position sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub driver_number: CarNumber,
    pub date: DateTime<Utc>,
    pub position: u32,
}

/// Lap record. The feed omits `date_start` on some laps (e.g. the formation lap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub driver_number: CarNumber,
    pub lap_number: u32,
    #[serde(default)]
    pub date_start: Option<DateTime<Utc>>,
}

/// 2D point in telemetry space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackPoint {
    pub x: f64,
    pub y: f64,
}

impl TrackPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, other: TrackPoint, t: f64) -> TrackPoint {
        TrackPoint::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// All three point streams for one time window
#[derive(Debug, Clone, Default)]
pub struct Slice {
    pub locations: Vec<LocationSample>,
    pub positions: Vec<PositionSample>,
    pub laps: Vec<Lap>,
}

impl Slice {
    /// True when neither the location nor the position stream had data
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.positions.is_empty()
    }
}

/// Records that belong to one car at one instant
pub trait Timestamped {
    fn car(&self) -> CarNumber;
    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

impl Timestamped for LocationSample {
    fn car(&self) -> CarNumber {
        self.driver_number
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }
}

impl Timestamped for PositionSample {
    fn car(&self) -> CarNumber {
        self.driver_number
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }
}

impl Timestamped for Lap {
    fn car(&self) -> CarNumber {
        self.driver_number
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date_start
    }
}

/// Reduce a batch to the latest record per car.
///
/// Equal timestamps resolve to the record that came last in the batch, since
/// the feed is non-decreasing in send order.
pub fn latest_per_car<T: Timestamped + Clone>(items: &[T]) -> BTreeMap<CarNumber, T> {
    let mut latest: BTreeMap<CarNumber, T> = BTreeMap::new();
    for item in items {
        let replace = match latest.get(&item.car()) {
            Some(prev) => prev.timestamp() <= item.timestamp(),
            None => true,
        };
        if replace {
            latest.insert(item.car(), item.clone());
        }
    }
    latest
}

/// Decode a JSON array element by element, skipping malformed entries so one
/// bad record never drops the whole batch.
pub fn decode_lenient<T: DeserializeOwned>(values: Vec<serde_json::Value>) -> Vec<T> {
    let total = values.len();
    let decoded: Vec<T> = values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping malformed record: {}", e);
                None
            }
        })
        .collect();
    if decoded.len() < total {
        debug!("Decoded {} of {} records", decoded.len(), total);
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn loc(car: CarNumber, secs: i64, x: f64) -> LocationSample {
        LocationSample {
            driver_number: car,
            date: at(secs),
            x,
            y: 0.0,
            z: 0.0,
        }
    }

    fn session(end: Option<DateTime<Utc>>) -> Session {
        Session {
            session_key: 9158,
            meeting_key: 1219,
            session_name: "Race".to_string(),
            country_name: "Italy".to_string(),
            location: "Monza".to_string(),
            circuit_short_name: "Monza".to_string(),
            date_start: at(0),
            date_end: end,
        }
    }

    #[test]
    fn test_session_end_defaults_to_two_hours() {
        let s = session(None);
        assert_eq!(s.duration(), Duration::hours(2));
    }

    #[test]
    fn test_session_end_before_start_is_clamped() {
        let s = session(Some(at(-60)));
        assert_eq!(s.end(), at(0) + Duration::hours(2));
    }

    #[test]
    fn test_session_end_is_kept_when_valid() {
        let s = session(Some(at(5400)));
        assert_eq!(s.end(), at(5400));
    }

    #[test]
    fn test_session_label() {
        assert_eq!(session(None).label(), "Italy • Monza • Monza");
    }

    #[test]
    fn test_session_deserializes_openf1_shape() {
        let json = r#"{
            "session_key": 9158,
            "meeting_key": 1219,
            "session_name": "Race",
            "country_name": "Singapore",
            "location": "Marina Bay",
            "circuit_short_name": "Singapore",
            "date_start": "2023-09-17T12:00:00+00:00",
            "date_end": "2023-09-17T14:00:00+00:00",
            "year": 2023
        }"#;
        let s: Session = serde_json::from_str(json).unwrap();
        assert_eq!(s.session_key, 9158);
        assert_eq!(s.duration(), Duration::hours(2));
    }

    #[test]
    fn test_driver_colour() {
        let mut d = Driver {
            driver_number: 1,
            name_acronym: "VER".to_string(),
            full_name: "Max VERSTAPPEN".to_string(),
            team_name: "Red Bull Racing".to_string(),
            team_colour: Some("3671C6".to_string()),
        };
        assert_eq!(d.colour(), "#3671C6");
        d.team_colour = None;
        assert_eq!(d.colour(), "#111");
    }

    #[test]
    fn test_latest_per_car_keeps_max_timestamp() {
        let items = vec![loc(1, 2, 20.0), loc(1, 1, 10.0), loc(2, 1, 5.0)];
        let latest = latest_per_car(&items);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&1].x, 20.0);
        assert_eq!(latest[&2].x, 5.0);
    }

    #[test]
    fn test_latest_per_car_ties_last_one_wins() {
        let items = vec![loc(1, 1, 10.0), loc(1, 1, 11.0)];
        let latest = latest_per_car(&items);
        assert_eq!(latest[&1].x, 11.0);
    }

    #[test]
    fn test_latest_lap_ignores_missing_start() {
        let laps = vec![
            Lap {
                driver_number: 4,
                lap_number: 12,
                date_start: Some(at(100)),
            },
            Lap {
                driver_number: 4,
                lap_number: 1,
                date_start: None,
            },
        ];
        let latest = latest_per_car(&laps);
        assert_eq!(latest[&4].lap_number, 12);
    }

    #[test]
    fn test_decode_lenient_skips_bad_records() {
        let values = vec![
            serde_json::json!({"driver_number": 1, "date": "2023-09-17T12:00:00.100000+00:00", "x": 1.0, "y": 2.0, "z": 0.0}),
            serde_json::json!({"driver_number": 2, "date": "not a date", "x": 1.0, "y": 2.0}),
            serde_json::json!({"driver_number": 3, "date": "2023-09-17T12:00:00+00:00", "x": null, "y": 2.0}),
            serde_json::json!({"driver_number": 4, "date": "2023-09-17T12:00:00+00:00", "x": 7.0, "y": 8.0}),
        ];
        let decoded: Vec<LocationSample> = decode_lenient(values);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].driver_number, 1);
        assert_eq!(decoded[1].driver_number, 4);
        assert_eq!(decoded[1].z, 0.0);
    }

    #[test]
    fn test_slice_is_empty_ignores_laps() {
        let slice = Slice {
            laps: vec![Lap {
                driver_number: 1,
                lap_number: 3,
                date_start: None,
            }],
            ..Default::default()
        };
        assert!(slice.is_empty());
    }
}
