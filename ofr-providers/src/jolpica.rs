//! Jolpica (Ergast-compatible) season client
//!
//! Calendars, race results and championship standings. Any non-success
//! status is returned as a typed error; nothing is retried.

use crate::http;
use ofr_core::season::{
    ConstructorSeasonRow, ConstructorStanding, DriverSeasonRow, DriverStanding, Race,
    RacesResponse, RoundResults, StandingsResponse,
};
use ofr_core::FetchError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.jolpi.ca/ergast/f1";

pub struct SeasonClient {
    http: Client,
    base_url: String,
}

impl SeasonClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: http::client(),
            base_url: base_url.to_string(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, FetchError> {
        let url = http::endpoint(&self.base_url, segments)?;
        debug!("GET {}", url);
        let resp = http::get(&self.http, url).await?;
        http::ensure_success(&resp)?;
        http::json(resp).await
    }

    /// Calendar of a season
    pub async fn season_races(&self, year: i32) -> Result<Vec<Race>, FetchError> {
        let body: RacesResponse = self.fetch(&[&format!("{}.json", year)]).await?;
        Ok(body.into_races())
    }

    pub async fn race(&self, year: i32, round: u32) -> Result<Option<Race>, FetchError> {
        let body: RacesResponse = self
            .fetch(&[&year.to_string(), &format!("{}.json", round)])
            .await?;
        Ok(body.into_first_race())
    }

    pub async fn race_results(&self, year: i32, round: u32) -> Result<Option<RoundResults>, FetchError> {
        let body: RacesResponse = self
            .fetch(&[&year.to_string(), &round.to_string(), "results.json"])
            .await?;
        Ok(body.into_round_results())
    }

    pub async fn driver_standings(&self, year: i32) -> Result<Vec<DriverStanding>, FetchError> {
        let body: StandingsResponse = self
            .fetch(&[&year.to_string(), "driverStandings.json"])
            .await?;
        Ok(body.into_driver_standings())
    }

    pub async fn constructor_standings(
        &self,
        year: i32,
    ) -> Result<Vec<ConstructorStanding>, FetchError> {
        let body: StandingsResponse = self
            .fetch(&[&year.to_string(), "constructorStandings.json"])
            .await?;
        Ok(body.into_constructor_standings())
    }

    /// Races of the season where the driver has a classification
    pub async fn driver_season_results(
        &self,
        year: i32,
        driver_id: &str,
    ) -> Result<Vec<DriverSeasonRow>, FetchError> {
        let body: RacesResponse = self
            .fetch(&[&year.to_string(), "drivers", driver_id, "results.json"])
            .await?;
        Ok(body.into_driver_season())
    }

    /// Every race of the season with the constructor's results, if any
    pub async fn constructor_season_results(
        &self,
        year: i32,
        constructor_id: &str,
    ) -> Result<Vec<ConstructorSeasonRow>, FetchError> {
        let body: RacesResponse = self
            .fetch(&[&year.to_string(), "constructors", constructor_id, "results.json"])
            .await?;
        Ok(body.into_constructor_season())
    }
}

impl Default for SeasonClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
