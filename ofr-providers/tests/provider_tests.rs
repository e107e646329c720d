//! Integration tests for the HTTP providers and the demo source
//!
//! The HTTP clients are pointed at a local axum server on 127.0.0.1:0 that
//! serves canned payloads, so no test touches the real APIs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, TimeZone, Utc};
use ofr_core::fetcher::{SliceQuery, TimeWindow};
use ofr_core::{EngineConfig, FetchError, ReplayEngine, TelemetrySource};
use ofr_providers::demo::DEMO_SESSION_KEY;
use ofr_providers::{DemoSource, GeometryClient, OpenF1Client, SeasonClient, TtlCache};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct Hits {
    location: AtomicUsize,
    geojson: AtomicUsize,
}

fn location_rows() -> Value {
    json!([
        {"driver_number": 1, "date": "2023-09-17T12:00:01.500000+00:00", "x": 100.0, "y": 200.0, "z": 0.0},
        {"driver_number": 16, "date": "2023-09-17T12:00:01.700000+00:00", "x": -300.0, "y": 50.0, "z": 0.0},
        {"driver_number": 44, "date": "broken", "x": 1.0, "y": 1.0}
    ])
}

async fn sessions() -> Json<Value> {
    Json(json!([{
        "session_key": 9158,
        "meeting_key": 1219,
        "session_name": "Race",
        "country_name": "Singapore",
        "location": "Marina Bay",
        "circuit_short_name": "Singapore",
        "date_start": "2023-09-17T12:00:00+00:00",
        "date_end": "2023-09-17T14:00:00+00:00"
    }]))
}

async fn drivers() -> Json<Value> {
    Json(json!([
        {"driver_number": 55, "name_acronym": "SAI", "full_name": "Carlos SAINZ", "team_name": "Ferrari", "team_colour": "F91536"},
        {"name_acronym": "???"}
    ]))
}

async fn location(
    State(hits): State<Arc<Hits>>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    hits.location.fetch_add(1, Ordering::SeqCst);
    if !q.contains_key("date>") || !q.contains_key("date<") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    match q.get("session_key").map(String::as_str) {
        Some("429") => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Some("404") => StatusCode::NOT_FOUND.into_response(),
        Some("500") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some("2") => Json(json!({"detail": "No results found."})).into_response(),
        _ => Json(location_rows()).into_response(),
    }
}

async fn empty_array() -> Json<Value> {
    Json(json!([]))
}

fn race_payload(with_results: bool) -> Value {
    let results = if with_results {
        json!([{
            "number": "1",
            "position": "1",
            "points": "25",
            "status": "Finished",
            "Driver": {"driverId": "max_verstappen", "givenName": "Max", "familyName": "Verstappen", "code": "VER"},
            "Constructor": {"constructorId": "red_bull", "name": "Red Bull"},
            "Time": {"time": "1:31:44.742", "millis": "5504742"}
        }])
    } else {
        json!([])
    };
    json!({
        "season": "2024",
        "round": "1",
        "raceName": "Bahrain Grand Prix",
        "date": "2024-03-02",
        "time": "15:00:00Z",
        "Circuit": {
            "circuitId": "bahrain",
            "circuitName": "Bahrain International Circuit",
            "Location": {"locality": "Sakhir", "country": "Bahrain", "lat": "26.0325", "long": "50.5106"}
        },
        "Results": results
    })
}

async fn season_2024() -> Json<Value> {
    Json(json!({"MRData": {"RaceTable": {"season": "2024", "Races": [race_payload(false)]}}}))
}

async fn driver_season(Path(id): Path<String>) -> Response {
    if id != "max_verstappen" && id != "nyck de vries" {
        return StatusCode::NOT_FOUND.into_response();
    }
    let mut second = race_payload(false);
    second["round"] = json!("2");
    second["raceName"] = json!("Saudi Arabian Grand Prix");
    Json(json!({"MRData": {"RaceTable": {"Races": [race_payload(true), second]}}})).into_response()
}

async fn driver_standings() -> Json<Value> {
    Json(json!({"MRData": {"StandingsTable": {"StandingsLists": [{
        "season": "2024",
        "round": "1",
        "DriverStandings": [{
            "position": "1", "points": "25", "wins": "1",
            "Driver": {"driverId": "max_verstappen", "givenName": "Max", "familyName": "Verstappen"},
            "Constructors": [{"constructorId": "red_bull", "name": "Red Bull"}]
        }]
    }]}}}))
}

async fn geojson(State(hits): State<Arc<Hits>>) -> Json<Value> {
    hits.geojson.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"Name": "Autodromo Nazionale Monza", "Location": "Monza"},
            "geometry": {"type": "LineString", "coordinates": [[9.28, 45.62], [9.29, 45.63], [9.28, 45.63]]}
        }]
    }))
}

/// Start the stub server, returning its base URL and hit counters
async fn spawn_stub() -> (String, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/v1/sessions", get(sessions))
        .route("/v1/drivers", get(drivers))
        .route("/v1/location", get(location))
        .route("/v1/position", get(empty_array))
        .route("/v1/laps", get(empty_array))
        .route("/ergast/f1/2024.json", get(season_2024))
        .route("/ergast/f1/1999.json", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
        .route("/ergast/f1/1998.json", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/ergast/f1/2024/drivers/:id/results.json",
            get(driver_season),
        )
        .route("/ergast/f1/2024/driverStandings.json", get(driver_standings))
        .route("/geo/circuits.geojson", get(geojson))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits)
}

fn window() -> TimeWindow {
    let center = Utc.with_ymd_and_hms(2023, 9, 17, 12, 0, 2).unwrap();
    TimeWindow::around(center, 650)
}

// ==================== OpenF1 ====================

#[tokio::test]
async fn test_openf1_sessions_and_roster() {
    let (base, _) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base));

    let sessions = client.race_sessions(2023).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_key, 9158);

    let roster = client.roster(9158).await.unwrap();
    assert_eq!(roster.len(), 1, "roster entry without a number should be skipped");
    assert_eq!(roster[0].colour(), "#F91536");
}

#[tokio::test]
async fn test_openf1_locations_skip_malformed_rows() {
    let (base, _) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base));
    let samples = client.locations(1, &window()).await.unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].driver_number, 16);
}

#[tokio::test]
async fn test_openf1_429_is_rate_limited() {
    let (base, _) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base));
    let err = client.locations(429, &window()).await.unwrap_err();
    assert!(err.is_rate_limited(), "expected RateLimited, got {:?}", err);

    let query = SliceQuery::plan(429, window().to, &EngineConfig::default());
    let err = client.fetch_slice(&query).await.unwrap_err();
    assert_eq!(err, FetchError::RateLimited);
}

#[tokio::test]
async fn test_openf1_not_found_and_detail_bodies_are_empty() {
    let (base, _) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base));
    assert!(client.locations(404, &window()).await.unwrap().is_empty());
    assert!(client.locations(2, &window()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_openf1_server_error_is_http_error() {
    let (base, _) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base));
    let err = client.locations(500, &window()).await.unwrap_err();
    assert_eq!(err, FetchError::Http { status: 500 });
}

#[tokio::test]
async fn test_openf1_cache_serves_repeat_requests() {
    let (base, hits) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base)).with_cache(Arc::new(TtlCache::in_memory()));

    client.locations(1, &window()).await.unwrap();
    let again = client.locations(1, &window()).await.unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(hits.location.load(Ordering::SeqCst), 1, "second call should hit the cache");

    // Failures are never cached
    client.locations(500, &window()).await.unwrap_err();
    client.locations(500, &window()).await.unwrap_err();
    assert_eq!(hits.location.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_openf1_without_cache_refetches() {
    let (base, hits) = spawn_stub().await;
    let client = OpenF1Client::new(&format!("{}/v1", base));
    client.locations(1, &window()).await.unwrap();
    client.locations(1, &window()).await.unwrap();
    assert_eq!(hits.location.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let client = OpenF1Client::new("http://127.0.0.1:1/v1");
    let err = client.race_sessions(2024).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "got {:?}", err);
}

// ==================== Jolpica ====================

#[tokio::test]
async fn test_jolpica_season_calendar() {
    let (base, _) = spawn_stub().await;
    let client = SeasonClient::new(&format!("{}/ergast/f1", base));
    let races = client.season_races(2024).await.unwrap();
    assert_eq!(races.len(), 1);
    assert_eq!(races[0].circuit.circuit_id, "bahrain");
    assert_eq!(
        races[0].start(),
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_jolpica_driver_season_keeps_classified_races() {
    let (base, _) = spawn_stub().await;
    let client = SeasonClient::new(&format!("{}/ergast/f1", base));
    let rows = client
        .driver_season_results(2024, "max_verstappen")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1, "race without results should be dropped");
    assert_eq!(rows[0].race_name, "Bahrain Grand Prix");
    assert_eq!(rows[0].result.points, "25");
}

#[tokio::test]
async fn test_jolpica_ids_are_single_path_segments() {
    let (base, _) = spawn_stub().await;
    let client = SeasonClient::new(&format!("{}/ergast/f1/", base));
    let rows = client
        .driver_season_results(2024, "nyck de vries")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let err = client
        .driver_season_results(2024, "max/verstappen")
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Http { status: 404 });
}

#[tokio::test]
async fn test_bad_base_url_is_typed_error() {
    let err = SeasonClient::new("not a url")
        .season_races(2024)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_jolpica_standings() {
    let (base, _) = spawn_stub().await;
    let client = SeasonClient::new(&format!("{}/ergast/f1", base));
    let standings = client.driver_standings(2024).await.unwrap();
    assert_eq!(standings.len(), 1);
    assert_eq!(standings[0].constructors[0].constructor_id, "red_bull");
}

#[tokio::test]
async fn test_jolpica_errors_are_typed() {
    let (base, _) = spawn_stub().await;
    let client = SeasonClient::new(&format!("{}/ergast/f1", base));
    assert_eq!(
        client.season_races(1999).await.unwrap_err(),
        FetchError::RateLimited
    );
    assert_eq!(client.season_races(1998).await.unwrap_err(), FetchError::Http { status: 503 });
    assert_eq!(client.season_races(1997).await.unwrap_err(), FetchError::Http { status: 404 });
}

// ==================== Geometry ====================

#[tokio::test]
async fn test_geometry_is_downloaded_once() {
    let (base, hits) = spawn_stub().await;
    let client = GeometryClient::new(&format!("{}/geo/circuits.geojson", base));

    let line = client.circuit_line("monza").await.unwrap().unwrap();
    assert_eq!(line.len(), 3);
    assert!(client.circuit_line("silverstone").await.unwrap().is_none());
    assert_eq!(hits.geojson.load(Ordering::SeqCst), 1);
}

// ==================== Demo source ====================

#[tokio::test]
async fn test_demo_session_and_roster() {
    let demo = DemoSource::new();
    let sessions = demo.race_sessions(2024).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].duration(), Duration::minutes(100));

    let roster = demo.roster(DEMO_SESSION_KEY).await.unwrap();
    assert_eq!(roster.len(), 20);
    let numbers: HashSet<u32> = roster.iter().map(|d| d.driver_number).collect();
    assert_eq!(numbers.len(), 20, "car numbers must be unique");
    assert!(demo.roster(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_demo_slice_mid_race() {
    let demo = DemoSource::new();
    let at = demo.session().date_start + Duration::minutes(10);
    let query = SliceQuery::plan(DEMO_SESSION_KEY, at, &EngineConfig::default());
    let slice = demo.fetch_slice(&query).await.unwrap();

    let cars: HashSet<u32> = slice.locations.iter().map(|s| s.driver_number).collect();
    assert_eq!(cars.len(), 20);
    assert!(slice.locations.iter().all(|s| query.locations.contains(s.date)));

    assert_eq!(slice.positions.len(), 20, "one position grid instant in the window");
    let mut places: Vec<u32> = slice.positions.iter().map(|p| p.position).collect();
    places.sort_unstable();
    assert_eq!(places, (1..=20).collect::<Vec<_>>());

    assert!(!slice.laps.is_empty());
    assert!(slice
        .laps
        .iter()
        .all(|l| l.date_start.is_some_and(|d| query.laps.contains(d))));
}

#[tokio::test]
async fn test_demo_is_quiet_before_the_start() {
    let demo = DemoSource::new();
    let at = demo.session().date_start + Duration::seconds(20);
    let query = SliceQuery::plan(DEMO_SESSION_KEY, at, &EngineConfig::default());
    let slice = demo.fetch_slice(&query).await.unwrap();
    assert!(slice.is_empty());
}

#[tokio::test]
async fn test_demo_is_deterministic() {
    let demo = DemoSource::new();
    let window = TimeWindow::around(demo.session().date_start + Duration::minutes(30), 650);
    let a = demo.locations(DEMO_SESSION_KEY, &window).await.unwrap();
    let b = demo.locations(DEMO_SESSION_KEY, &window).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_demo_drives_the_engine() {
    let demo = DemoSource::new();
    let mut engine = ReplayEngine::new(EngineConfig::default());
    let epoch = engine.begin_session_with(demo.session().clone());
    assert!(engine.commit_roster(epoch, demo.roster(DEMO_SESSION_KEY).await.unwrap()));
    engine.pause();
    engine.scrub_to(0.25);

    let now = Instant::now();
    let ticket = engine.next_fetch(now).expect("first fetch");
    let slice = demo.fetch_slice(&ticket.query).await.unwrap();
    assert_eq!(
        engine.commit_slice(&ticket, slice, now),
        ofr_core::engine::CommitOutcome::Applied
    );

    let scene = engine.render(now);
    assert_eq!(scene.cars.len(), 20);
    assert_eq!(scene.order.len(), 20);
    assert_eq!(scene.order[0].position, 1);
}
