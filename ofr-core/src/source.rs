//! Telemetry source trait definition

use crate::error::FetchError;
use crate::fetcher::{SliceQuery, TimeWindow};
use crate::model::{Driver, Lap, LocationSample, PositionSample, Session, Slice};
use async_trait::async_trait;

/// Trait for telemetry point-sample providers
///
/// Each source is responsible for:
/// - Listing the race sessions of a year
/// - Serving the driver roster of a session
/// - Serving location, position and lap samples inside a time window
///
/// Empty or not-found windows are `Ok(vec![])`, never an error.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Get the name of this source (e.g., "OpenF1", "Demo")
    fn name(&self) -> &str;

    /// Race sessions of the given year, in any order
    async fn race_sessions(&self, year: i32) -> Result<Vec<Session>, FetchError>;

    /// Roster of one session
    async fn roster(&self, session_key: u32) -> Result<Vec<Driver>, FetchError>;

    /// Location samples with `from <= date <= to`
    async fn locations(
        &self,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Vec<LocationSample>, FetchError>;

    /// Position samples with `from <= date <= to`
    async fn positions(
        &self,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Vec<PositionSample>, FetchError>;

    /// Laps whose start lies inside the window
    async fn laps(&self, session_key: u32, window: &TimeWindow) -> Result<Vec<Lap>, FetchError>;

    /// Fetch all three streams of a slice concurrently.
    ///
    /// Non-finite coordinates are dropped here; time filtering is left to the
    /// source.
    async fn fetch_slice(&self, query: &SliceQuery) -> Result<Slice, FetchError> {
        let (locations, positions, laps) = futures::try_join!(
            self.locations(query.session_key, &query.locations),
            self.positions(query.session_key, &query.positions),
            self.laps(query.session_key, &query.laps),
        )?;

        Ok(Slice {
            locations: locations.into_iter().filter(|s| s.is_finite()).collect(),
            positions,
            laps,
        })
    }
}
