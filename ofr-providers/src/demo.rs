//! Demo source that generates synthetic race telemetry
//!
//! Twenty cars lap a closed circuit built from straights and corners, each at
//! a slightly different pace. Samples are produced on a fixed grid inside any
//! requested window, so the same window always yields the same data.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ofr_core::fetcher::TimeWindow;
use ofr_core::model::{CarNumber, Driver, Lap, LocationSample, PositionSample, Session, TrackPoint};
use ofr_core::{FetchError, TelemetrySource};
use std::f64::consts::FRAC_PI_2;

pub const DEMO_SESSION_KEY: u32 = 9000;

/// Location sample spacing
const LOCATION_STEP_MS: i64 = 270;
/// Position sample spacing
const POSITION_STEP_MS: i64 = 2000;
/// Nothing is transmitted before the lights go out
const QUIET_SECS: i64 = 60;
const SESSION_MINUTES: i64 = 100;
/// Lap fraction between consecutive grid slots
const GRID_GAP: f64 = 0.012;

// =============================================================================
// Track definition: a sequence of segments that form a lap
// =============================================================================

#[derive(Clone, Copy)]
enum SegmentKind {
    Straight, // Full throttle
    Corner,   // Quarter turn to the left
}

#[derive(Clone, Copy)]
struct TrackSegment {
    kind: SegmentKind,
    length: f64, // straight length, or corner radius
    speed: f64,  // units per second
}

impl TrackSegment {
    fn distance(&self) -> f64 {
        match self.kind {
            SegmentKind::Straight => self.length,
            SegmentKind::Corner => self.length * FRAC_PI_2,
        }
    }

    fn duration(&self) -> f64 {
        self.distance() / self.speed
    }
}

/// Rounded rectangle with uneven corners; closes exactly on itself
fn demo_track() -> Vec<TrackSegment> {
    use SegmentKind::*;
    vec![
        TrackSegment { kind: Straight, length: 5200.0, speed: 330.0 },
        TrackSegment { kind: Corner,   length: 900.0,  speed: 190.0 },
        TrackSegment { kind: Straight, length: 2600.0, speed: 280.0 },
        TrackSegment { kind: Corner,   length: 600.0,  speed: 140.0 },
        TrackSegment { kind: Straight, length: 4800.0, speed: 320.0 },
        TrackSegment { kind: Corner,   length: 1200.0, speed: 220.0 },
        TrackSegment { kind: Straight, length: 2400.0, speed: 270.0 },
        TrackSegment { kind: Corner,   length: 500.0,  speed: 120.0 },
    ]
}

/// Where a car is after `lap_time` seconds into a lap of the track
fn point_at(track: &[TrackSegment], lap_time: f64) -> TrackPoint {
    let mut origin = TrackPoint::new(-2600.0, -1500.0);
    let mut heading = 0.0_f64;
    let mut remaining = lap_time.max(0.0);

    for seg in track {
        let d = seg.duration();
        let frac = (remaining / d).min(1.0);
        let (dir_x, dir_y) = (heading.cos(), heading.sin());
        match seg.kind {
            SegmentKind::Straight => {
                let l = seg.length * frac;
                let p = TrackPoint::new(origin.x + dir_x * l, origin.y + dir_y * l);
                if remaining <= d {
                    return p;
                }
                origin = p;
            }
            SegmentKind::Corner => {
                // Center of the turn is one radius to the left of travel
                let r = seg.length;
                let cx = origin.x - dir_y * r;
                let cy = origin.y + dir_x * r;
                let a = heading - FRAC_PI_2 + FRAC_PI_2 * frac;
                let p = TrackPoint::new(cx + r * a.cos(), cy + r * a.sin());
                if remaining <= d {
                    return p;
                }
                origin = p;
                heading += FRAC_PI_2;
            }
        }
        remaining -= d;
    }
    origin
}

/// Simple deterministic noise from a seed
fn noise(seed: f64) -> f64 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f64, amplitude: f64) -> f64 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

/// (number, acronym, full name, team, colour)
const GRID: [(CarNumber, &str, &str, &str, &str); 20] = [
    (1, "VER", "Max VERSTAPPEN", "Red Bull Racing", "3671C6"),
    (11, "PER", "Sergio PEREZ", "Red Bull Racing", "3671C6"),
    (16, "LEC", "Charles LECLERC", "Ferrari", "E8002D"),
    (55, "SAI", "Carlos SAINZ", "Ferrari", "E8002D"),
    (63, "RUS", "George RUSSELL", "Mercedes", "27F4D2"),
    (44, "HAM", "Lewis HAMILTON", "Mercedes", "27F4D2"),
    (4, "NOR", "Lando NORRIS", "McLaren", "FF8000"),
    (81, "PIA", "Oscar PIASTRI", "McLaren", "FF8000"),
    (14, "ALO", "Fernando ALONSO", "Aston Martin", "229971"),
    (18, "STR", "Lance STROLL", "Aston Martin", "229971"),
    (10, "GAS", "Pierre GASLY", "Alpine", "FF87BC"),
    (31, "OCO", "Esteban OCON", "Alpine", "FF87BC"),
    (23, "ALB", "Alexander ALBON", "Williams", "64C4FF"),
    (2, "SAR", "Logan SARGEANT", "Williams", "64C4FF"),
    (22, "TSU", "Yuki TSUNODA", "RB", "6692FF"),
    (3, "RIC", "Daniel RICCIARDO", "RB", "6692FF"),
    (77, "BOT", "Valtteri BOTTAS", "Kick Sauber", "52E252"),
    (24, "ZHO", "Guanyu ZHOU", "Kick Sauber", "52E252"),
    (27, "HUL", "Nico HULKENBERG", "Haas F1 Team", "B6BABD"),
    (20, "MAG", "Kevin MAGNUSSEN", "Haas F1 Team", "B6BABD"),
];

/// One simulated car
#[derive(Clone, Copy)]
struct DemoCar {
    number: CarNumber,
    slot: usize,
    lap_secs: f64,
}

impl DemoCar {
    /// Laps covered `secs` after the start, negative while behind the line
    fn distance(&self, secs: f64) -> f64 {
        secs.max(0.0) / self.lap_secs - self.slot as f64 * GRID_GAP
    }

    /// Seconds after the start at which `lap` (1-based) begins
    fn lap_start(&self, lap: u32) -> f64 {
        if lap <= 1 {
            0.0
        } else {
            ((lap - 1) as f64 + self.slot as f64 * GRID_GAP) * self.lap_secs
        }
    }
}

pub struct DemoSource {
    session: Session,
    track: Vec<TrackSegment>,
    lap_duration: f64,
    cars: Vec<DemoCar>,
}

impl DemoSource {
    pub fn new() -> Self {
        let track = demo_track();
        let lap_duration: f64 = track.iter().map(|s| s.duration()).sum();
        let cars = GRID
            .iter()
            .enumerate()
            .map(|(slot, (number, ..))| DemoCar {
                number: *number,
                slot,
                // Slower towards the back of the grid, with a little variety
                lap_secs: lap_duration * (1.0 + slot as f64 * 0.0025 + jitter(*number as f64, 0.002)),
            })
            .collect();

        let date_start = Utc
            .with_ymd_and_hms(2024, 3, 2, 15, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let session = Session {
            session_key: DEMO_SESSION_KEY,
            meeting_key: DEMO_SESSION_KEY,
            session_name: "Race".to_string(),
            country_name: "Demo".to_string(),
            location: "Synthetic Park".to_string(),
            circuit_short_name: "Demo Ring".to_string(),
            date_start,
            date_end: Some(date_start + Duration::minutes(SESSION_MINUTES)),
        };

        Self {
            session,
            track,
            lap_duration,
            cars,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Nominal lap time of the fastest car, in seconds
    pub fn lap_duration(&self) -> f64 {
        self.lap_duration
    }

    fn race_start(&self) -> DateTime<Utc> {
        self.session.date_start + Duration::seconds(QUIET_SECS)
    }

    fn secs_since_start(&self, ts: DateTime<Utc>) -> f64 {
        (ts - self.race_start()).num_milliseconds() as f64 / 1000.0
    }

    /// Grid instants inside `window` that fall within the transmitted part of
    /// the session
    fn grid(&self, window: &TimeWindow, step_ms: i64) -> Vec<DateTime<Utc>> {
        let from = window.from.max(self.race_start());
        let to = window.to.min(self.session.end());
        if from > to {
            return Vec::new();
        }
        let origin = self.session.date_start.timestamp_millis();
        let first = (from.timestamp_millis() - origin + step_ms - 1).div_euclid(step_ms);
        let last = (to.timestamp_millis() - origin).div_euclid(step_ms);
        (first..=last)
            .filter_map(|k| DateTime::<Utc>::from_timestamp_millis(origin + k * step_ms))
            .collect()
    }

    fn location(&self, car: &DemoCar, ts: DateTime<Utc>) -> LocationSample {
        let laps = car.distance(self.secs_since_start(ts));
        let lap_time = laps.rem_euclid(1.0) * self.lap_duration;
        let p = point_at(&self.track, lap_time);
        let seed = ts.timestamp_millis() as f64 * 0.001 + car.number as f64;
        LocationSample {
            driver_number: car.number,
            date: ts,
            x: (p.x + jitter(seed, 4.0)).round(),
            y: (p.y + jitter(seed * 1.1, 4.0)).round(),
            z: 0.0,
        }
    }

    fn running_order(&self, ts: DateTime<Utc>) -> Vec<CarNumber> {
        let secs = self.secs_since_start(ts);
        let mut order: Vec<(CarNumber, f64)> = self
            .cars
            .iter()
            .map(|c| (c.number, c.distance(secs)))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));
        order.into_iter().map(|(n, _)| n).collect()
    }
}

impl Default for DemoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for DemoSource {
    fn name(&self) -> &str {
        "Demo"
    }

    /// The one demo race, whatever the year
    async fn race_sessions(&self, _year: i32) -> Result<Vec<Session>, FetchError> {
        Ok(vec![self.session.clone()])
    }

    async fn roster(&self, session_key: u32) -> Result<Vec<Driver>, FetchError> {
        if session_key != DEMO_SESSION_KEY {
            return Ok(Vec::new());
        }
        Ok(GRID
            .iter()
            .map(|(number, acronym, name, team, colour)| Driver {
                driver_number: *number,
                name_acronym: acronym.to_string(),
                full_name: name.to_string(),
                team_name: team.to_string(),
                team_colour: Some(colour.to_string()),
            })
            .collect())
    }

    async fn locations(
        &self,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Vec<LocationSample>, FetchError> {
        if session_key != DEMO_SESSION_KEY {
            return Ok(Vec::new());
        }
        Ok(self
            .grid(window, LOCATION_STEP_MS)
            .into_iter()
            .flat_map(|ts| self.cars.iter().map(move |car| self.location(car, ts)))
            .collect())
    }

    async fn positions(
        &self,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Vec<PositionSample>, FetchError> {
        if session_key != DEMO_SESSION_KEY {
            return Ok(Vec::new());
        }
        let mut samples = Vec::new();
        for ts in self.grid(window, POSITION_STEP_MS) {
            for (i, car) in self.running_order(ts).into_iter().enumerate() {
                samples.push(PositionSample {
                    driver_number: car,
                    date: ts,
                    position: i as u32 + 1,
                });
            }
        }
        Ok(samples)
    }

    async fn laps(&self, session_key: u32, window: &TimeWindow) -> Result<Vec<Lap>, FetchError> {
        if session_key != DEMO_SESSION_KEY {
            return Ok(Vec::new());
        }
        let start = self.race_start();
        let to = window.to.min(self.session.end());
        let mut laps = Vec::new();
        for car in &self.cars {
            let max_secs = self.secs_since_start(to);
            let mut lap = 1;
            while car.lap_start(lap) <= max_secs {
                let ms = (car.lap_start(lap) * 1000.0).round() as i64;
                let date_start = start + Duration::milliseconds(ms);
                if window.contains(date_start) {
                    laps.push(Lap {
                        driver_number: car.number,
                        lap_number: lap,
                        date_start: Some(date_start),
                    });
                }
                lap += 1;
            }
        }
        laps.sort_by_key(|l| l.date_start);
        Ok(laps)
    }
}
