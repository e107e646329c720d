//! Season data model (Jolpica / Ergast response shapes)
//!
//! Every field except identifiers tolerates absence: the upstream API omits
//! fields freely and partial payloads must still decode.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduled start of a weekend session (practice, qualifying, sprint)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CircuitLocation {
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub lat: Option<String>,
    #[serde(default)]
    pub long: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    #[serde(default)]
    pub circuit_id: String,
    #[serde(default)]
    pub circuit_name: String,
    #[serde(rename = "Location", default)]
    pub location: CircuitLocation,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    #[serde(default)]
    pub season: String,
    #[serde(default)]
    pub round: String,
    #[serde(default)]
    pub race_name: String,
    /// YYYY-MM-DD
    #[serde(default)]
    pub date: String,
    /// HH:MM:SSZ
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "Circuit", default)]
    pub circuit: Circuit,
    #[serde(rename = "FirstPractice", default)]
    pub first_practice: Option<ScheduleEntry>,
    #[serde(rename = "SecondPractice", default)]
    pub second_practice: Option<ScheduleEntry>,
    #[serde(rename = "ThirdPractice", default)]
    pub third_practice: Option<ScheduleEntry>,
    #[serde(rename = "Qualifying", default)]
    pub qualifying: Option<ScheduleEntry>,
    #[serde(rename = "Sprint", default)]
    pub sprint: Option<ScheduleEntry>,
    /// Only present on results endpoints
    #[serde(rename = "Results", default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<RaceResult>,
}

impl Race {
    /// Race start in UTC; midnight UTC when the start time is unknown
    pub fn start(&self) -> Option<DateTime<Utc>> {
        race_start(&self.date, self.time.as_deref())
    }
}

/// Combine an Ergast date and optional `HH:MM:SSZ` time into a UTC instant
pub fn race_start(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let clock = match time {
        Some(t) => NaiveTime::parse_from_str(t.trim_end_matches('Z'), "%H:%M:%S").ok()?,
        None => NaiveTime::from_hms_opt(0, 0, 0)?,
    };
    Some(day.and_time(clock).and_utc())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    #[serde(default)]
    pub driver_id: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub permanent_number: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
}

impl DriverInfo {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constructor {
    #[serde(default)]
    pub constructor_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub time: String,
    #[serde(default)]
    pub millis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageSpeed {
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub speed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastestLap {
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub lap: Option<String>,
    #[serde(rename = "Time", default)]
    pub time: Option<TimeValue>,
    #[serde(rename = "AverageSpeed", default)]
    pub average_speed: Option<AverageSpeed>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub position_text: Option<String>,
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub grid: Option<String>,
    #[serde(default)]
    pub laps: Option<String>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<DriverInfo>,
    #[serde(rename = "Constructor", default)]
    pub constructor: Option<Constructor>,
    /// Absent when the car did not finish or was lapped
    #[serde(rename = "Time", default)]
    pub time: Option<TimeValue>,
    #[serde(rename = "FastestLap", default)]
    pub fastest_lap: Option<FastestLap>,
}

/// How a result ended, made explicit instead of a missing `Time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finish {
    Classified { time: String },
    Unclassified { status: String },
}

impl RaceResult {
    pub fn finish(&self) -> Finish {
        match &self.time {
            Some(t) => Finish::Classified {
                time: t.time.clone(),
            },
            None => Finish::Unclassified {
                status: self.status.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverStanding {
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub wins: String,
    #[serde(rename = "Driver", default)]
    pub driver: Option<DriverInfo>,
    #[serde(rename = "Constructors", default)]
    pub constructors: Vec<Constructor>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstructorStanding {
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub wins: String,
    #[serde(rename = "Constructor", default)]
    pub constructor: Option<Constructor>,
}

/// One race of a driver's season, with that driver's result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSeasonRow {
    pub round: String,
    pub race_name: String,
    pub date: String,
    pub result: RaceResult,
}

/// One race of a constructor's season, with both cars' results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructorSeasonRow {
    pub round: String,
    pub race_name: String,
    pub date: String,
    pub results: Vec<RaceResult>,
}

/// Race name plus classification for one round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResults {
    pub race_name: String,
    pub results: Vec<RaceResult>,
}

// === Response envelopes ===

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RaceTable {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(rename = "Races", default)]
    pub races: Vec<Race>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RaceData {
    #[serde(rename = "RaceTable", default)]
    pub race_table: RaceTable,
}

/// Body of every race-table endpoint (`/{year}.json`, `/results.json`, ...)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RacesResponse {
    #[serde(rename = "MRData", default)]
    pub mr_data: RaceData,
}

impl RacesResponse {
    pub fn into_races(self) -> Vec<Race> {
        self.mr_data.race_table.races
    }

    pub fn into_first_race(self) -> Option<Race> {
        self.into_races().into_iter().next()
    }

    pub fn into_round_results(self) -> Option<RoundResults> {
        self.into_first_race().map(|race| RoundResults {
            race_name: race.race_name,
            results: race.results,
        })
    }

    /// Races where the driver has a result; the first result is kept
    pub fn into_driver_season(self) -> Vec<DriverSeasonRow> {
        self.into_races()
            .into_iter()
            .filter_map(|race| {
                let result = race.results.into_iter().next()?;
                Some(DriverSeasonRow {
                    round: race.round,
                    race_name: race.race_name,
                    date: race.date,
                    result,
                })
            })
            .collect()
    }

    /// Every race, even ones without results for the constructor
    pub fn into_constructor_season(self) -> Vec<ConstructorSeasonRow> {
        self.into_races()
            .into_iter()
            .map(|race| ConstructorSeasonRow {
                round: race.round,
                race_name: race.race_name,
                date: race.date,
                results: race.results,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandingsList {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub round: Option<String>,
    #[serde(rename = "DriverStandings", default)]
    pub driver_standings: Vec<DriverStanding>,
    #[serde(rename = "ConstructorStandings", default)]
    pub constructor_standings: Vec<ConstructorStanding>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandingsTable {
    #[serde(default)]
    pub season: Option<String>,
    #[serde(rename = "StandingsLists", default)]
    pub standings_lists: Vec<StandingsList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandingsData {
    #[serde(rename = "StandingsTable", default)]
    pub standings_table: StandingsTable,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandingsResponse {
    #[serde(rename = "MRData", default)]
    pub mr_data: StandingsData,
}

impl StandingsResponse {
    fn into_first_list(self) -> Option<StandingsList> {
        self.mr_data
            .standings_table
            .standings_lists
            .into_iter()
            .next()
    }

    pub fn into_driver_standings(self) -> Vec<DriverStanding> {
        self.into_first_list()
            .map(|l| l.driver_standings)
            .unwrap_or_default()
    }

    pub fn into_constructor_standings(self) -> Vec<ConstructorStanding> {
        self.into_first_list()
            .map(|l| l.constructor_standings)
            .unwrap_or_default()
    }
}
