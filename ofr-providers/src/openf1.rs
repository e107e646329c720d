//! OpenF1 telemetry client
//!
//! Serves sessions, rosters and the location/position/lap point streams from
//! `api.openf1.org`. Responses are cached by URL; a 404 or a non-array body
//! (the API answers `{"detail": "No results found."}` for empty windows) is
//! treated as "no data".

use crate::cache::TtlCache;
use crate::http;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ofr_core::fetcher::TimeWindow;
use ofr_core::model::{decode_lenient, Driver, Lap, LocationSample, PositionSample, Session};
use ofr_core::{FetchError, TelemetrySource};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openf1.org/v1";

pub struct OpenF1Client {
    http: Client,
    base_url: String,
    cache: Option<Arc<TtlCache<Value>>>,
}

impl OpenF1Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: http::client(),
            base_url: base_url.to_string(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TtlCache<Value>>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn stream_url(&self, stream: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = http::endpoint(&self.base_url, &[stream])?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_array(&self, url: Url) -> Result<Vec<Value>, FetchError> {
        let key = url.as_str().to_string();
        if let Some(Value::Array(items)) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return Ok(items);
        }

        let resp = http::get(&self.http, url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("No data at {}", key);
            return Ok(Vec::new());
        }
        http::ensure_success(&resp)?;

        match http::json::<Value>(resp).await? {
            Value::Array(items) => {
                if let Some(cache) = &self.cache {
                    cache.insert(&key, Value::Array(items.clone()));
                }
                Ok(items)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// `field>=from` and `field<=to` filters; the comparison operator is
    /// part of the query key (`date>`), the `=` separates the value
    fn window_url(
        &self,
        stream: &str,
        field: &str,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Url, FetchError> {
        let session_key = session_key.to_string();
        let (from, to) = (iso(window.from), iso(window.to));
        let (after, before) = (format!("{}>", field), format!("{}<", field));
        self.stream_url(
            stream,
            &[
                ("session_key", session_key.as_str()),
                (after.as_str(), from.as_str()),
                (before.as_str(), to.as_str()),
            ],
        )
    }
}

impl Default for OpenF1Client {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// ISO-8601 with milliseconds and a `Z` suffix
fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl TelemetrySource for OpenF1Client {
    fn name(&self) -> &str {
        "OpenF1"
    }

    async fn race_sessions(&self, year: i32) -> Result<Vec<Session>, FetchError> {
        let year = year.to_string();
        let url = self.stream_url("sessions", &[("year", year.as_str()), ("session_name", "Race")])?;
        Ok(decode_lenient(self.get_array(url).await?))
    }

    async fn roster(&self, session_key: u32) -> Result<Vec<Driver>, FetchError> {
        let session_key = session_key.to_string();
        let url = self.stream_url("drivers", &[("session_key", session_key.as_str())])?;
        Ok(decode_lenient(self.get_array(url).await?))
    }

    async fn locations(
        &self,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Vec<LocationSample>, FetchError> {
        let url = self.window_url("location", "date", session_key, window)?;
        Ok(decode_lenient(self.get_array(url).await?))
    }

    async fn positions(
        &self,
        session_key: u32,
        window: &TimeWindow,
    ) -> Result<Vec<PositionSample>, FetchError> {
        let url = self.window_url("position", "date", session_key, window)?;
        Ok(decode_lenient(self.get_array(url).await?))
    }

    async fn laps(&self, session_key: u32, window: &TimeWindow) -> Result<Vec<Lap>, FetchError> {
        let url = self.window_url("laps", "date_start", session_key, window)?;
        Ok(decode_lenient(self.get_array(url).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_url_is_encoded() {
        let client = OpenF1Client::new("http://localhost:1/v1/");
        let center = Utc.with_ymd_and_hms(2023, 9, 17, 12, 0, 2).unwrap();
        let url = client
            .window_url("location", "date", 9158, &TimeWindow::around(center, 650))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:1/v1/location?session_key=9158&date%3E=2023-09-17T12%3A00%3A01.350Z&date%3C=2023-09-17T12%3A00%3A02.650Z"
        );
    }

    #[test]
    fn test_window_bounds_decode_to_operator_keys() {
        let client = OpenF1Client::default();
        let center = Utc.with_ymd_and_hms(2023, 9, 17, 12, 0, 0).unwrap();
        let url = client
            .window_url("laps", "date_start", 9158, &TimeWindow::around(center, 1000))
            .unwrap();
        assert!(url.as_str().starts_with("https://api.openf1.org/v1/laps?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("session_key".to_string(), "9158".to_string()),
                ("date_start>".to_string(), "2023-09-17T11:59:59.000Z".to_string()),
                ("date_start<".to_string(), "2023-09-17T12:00:01.000Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_sessions_url() {
        let client = OpenF1Client::new("https://api.openf1.org/v1");
        let url = client
            .stream_url("sessions", &[("year", "2024"), ("session_name", "Race")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.openf1.org/v1/sessions?year=2024&session_name=Race"
        );
    }
}
