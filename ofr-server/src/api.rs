//! REST API and SSE routes

use crate::runtime;
use crate::state::AppState;
use crate::web_ui;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use ofr_core::clock::PlaybackState;
use ofr_core::model::Session;
use ofr_core::scene::Scene;
use ofr_core::FetchError;
use ofr_providers::geometry::line_to_svg_path;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

type ApiError = (StatusCode, String);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(web_ui::serve_ui))
        // Season endpoints
        .route("/api/seasons/:year/races", get(season_races))
        .route("/api/seasons/:year/races/:round", get(season_race))
        .route("/api/seasons/:year/races/:round/results", get(race_results))
        .route("/api/seasons/:year/standings/drivers", get(driver_standings))
        .route(
            "/api/seasons/:year/standings/constructors",
            get(constructor_standings),
        )
        .route("/api/seasons/:year/drivers/:id/results", get(driver_season))
        .route(
            "/api/seasons/:year/constructors/:id/results",
            get(constructor_season),
        )
        .route("/api/circuits/:id/geometry", get(circuit_geometry))
        // Replay endpoints
        .route("/api/replay/sessions", get(replay_sessions))
        .route("/api/replay/session", post(replay_select_session))
        .route("/api/replay/info", get(replay_info))
        .route("/api/replay/scene", get(replay_scene))
        .route("/api/replay/scene.svg", get(replay_scene_svg))
        .route("/api/replay/control", post(replay_control))
        .route("/api/replay/stream", get(replay_stream))
        .route("/api/replay", axum::routing::delete(replay_delete))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Explicit loading outcome: data, or a definite "nothing there"
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Loaded<T> {
    Ready { data: T },
    Empty,
}

impl<T> Loaded<Vec<T>> {
    fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Loaded::Empty
        } else {
            Loaded::Ready { data: items }
        }
    }
}

impl<T> Loaded<T> {
    fn from_option(item: Option<T>) -> Self {
        match item {
            Some(data) => Loaded::Ready { data },
            None => Loaded::Empty,
        }
    }
}

fn upstream(e: FetchError) -> ApiError {
    tracing::warn!("Upstream request failed: {}", e);
    (StatusCode::BAD_GATEWAY, format!("Upstream request failed: {}", e))
}

// === Season Endpoints ===

async fn season_races(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let races = state.seasons.season_races(year).await.map_err(upstream)?;
    Ok(Json(Loaded::from_vec(races)))
}

async fn season_race(
    State(state): State<AppState>,
    Path((year, round)): Path<(i32, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let race = state.seasons.race(year, round).await.map_err(upstream)?;
    Ok(Json(Loaded::from_option(race)))
}

async fn race_results(
    State(state): State<AppState>,
    Path((year, round)): Path<(i32, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state
        .seasons
        .race_results(year, round)
        .await
        .map_err(upstream)?
        .filter(|r| !r.results.is_empty());
    Ok(Json(Loaded::from_option(results)))
}

async fn driver_standings(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.seasons.driver_standings(year).await.map_err(upstream)?;
    Ok(Json(Loaded::from_vec(rows)))
}

async fn constructor_standings(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .seasons
        .constructor_standings(year)
        .await
        .map_err(upstream)?;
    Ok(Json(Loaded::from_vec(rows)))
}

async fn driver_season(
    State(state): State<AppState>,
    Path((year, id)): Path<(i32, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .seasons
        .driver_season_results(year, &id)
        .await
        .map_err(upstream)?;
    Ok(Json(Loaded::from_vec(rows)))
}

async fn constructor_season(
    State(state): State<AppState>,
    Path((year, id)): Path<(i32, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .seasons
        .constructor_season_results(year, &id)
        .await
        .map_err(upstream)?;
    Ok(Json(Loaded::from_vec(rows)))
}

#[derive(Serialize)]
struct CircuitGeometry {
    circuit_id: String,
    coordinates: Vec<[f64; 2]>,
    svg_path: String,
}

async fn circuit_geometry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CircuitGeometry>, ApiError> {
    let coordinates = state
        .geometry
        .circuit_line(&id)
        .await
        .map_err(upstream)?
        .ok_or((StatusCode::NOT_FOUND, format!("No geometry for circuit {}", id)))?;
    let svg_path = line_to_svg_path(&coordinates, 160.0, 120.0, 8.0);
    Ok(Json(CircuitGeometry {
        circuit_id: id,
        coordinates,
        svg_path,
    }))
}

// === Replay Endpoints ===

#[derive(Deserialize)]
struct YearQuery {
    year: i32,
}

async fn replay_sessions(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
) -> Result<Json<Loaded<Vec<Session>>>, ApiError> {
    let sessions = runtime::load_year(&state, query.year)
        .await
        .map_err(upstream)?;
    Ok(Json(Loaded::from_vec(sessions)))
}

#[derive(Deserialize)]
struct SelectSessionRequest {
    session_key: u32,
    /// Ergast circuit id for the optional map overlay
    circuit_id: Option<String>,
}

async fn replay_select_session(
    State(state): State<AppState>,
    Json(request): Json<SelectSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session =
        runtime::select_session(&state, request.session_key, request.circuit_id.as_deref())
            .await
            .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(session))
}

/// Serializable replay status for the API
#[derive(Debug, Serialize)]
struct ReplayInfo {
    year: Option<i32>,
    sessions: usize,
    session: Option<Session>,
    drivers: usize,
    state: PlaybackState,
    t: f64,
    speed: f64,
    time: Option<DateTime<Utc>>,
    running: bool,
    rate_limited: bool,
    banner: Option<String>,
}

async fn replay_info(State(state): State<AppState>) -> Json<ReplayInfo> {
    let running = runtime::is_running(&state).await;
    let engine = state.engine.read().await;
    let now = Instant::now();
    Json(ReplayInfo {
        year: engine.year(),
        sessions: engine.sessions().len(),
        session: engine.session().cloned(),
        drivers: engine.roster().len(),
        state: engine.playback_state(),
        t: engine.clock().position(),
        speed: engine.clock().speed(),
        time: engine.current_time(),
        running,
        rate_limited: engine.is_rate_limited(now),
        banner: engine.banner(now).map(|b| b.text()),
    })
}

async fn current_scene(state: &AppState) -> Scene {
    state.engine.write().await.render(Instant::now())
}

async fn replay_scene(State(state): State<AppState>) -> Json<Scene> {
    Json(current_scene(&state).await)
}

async fn replay_scene_svg(State(state): State<AppState>) -> impl IntoResponse {
    let svg = current_scene(&state).await.to_svg();
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}

#[derive(Deserialize)]
struct ReplayControlRequest {
    action: String,
    value: Option<f64>,
}

fn require_value(request: &ReplayControlRequest) -> Result<f64, ApiError> {
    request
        .value
        .filter(|v| v.is_finite())
        .ok_or((
            StatusCode::BAD_REQUEST,
            format!("Missing 'value' for {}", request.action),
        ))
}

async fn replay_control(
    State(state): State<AppState>,
    Json(request): Json<ReplayControlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    if engine.session().is_none() {
        return Err((StatusCode::NOT_FOUND, "No session selected".to_string()));
    }

    let reply = match request.action.as_str() {
        "play" => {
            engine.play();
            serde_json::json!({"status": "playing"})
        }
        "pause" => {
            engine.pause();
            serde_json::json!({"status": "paused"})
        }
        "scrub_start" => {
            engine.begin_scrub();
            serde_json::json!({"status": "scrubbing"})
        }
        "scrub" => {
            engine.scrub_to(require_value(&request)?);
            state.fetch_wake.notify_one();
            serde_json::json!({"status": "scrubbed", "t": engine.clock().position()})
        }
        "scrub_end" => {
            engine.end_scrub();
            state.fetch_wake.notify_one();
            serde_json::json!({"status": "paused", "t": engine.clock().position()})
        }
        "speed" => {
            engine.set_speed(require_value(&request)?);
            serde_json::json!({"status": "speed_set", "speed": engine.clock().speed()})
        }
        "focus" => {
            let value = require_value(&request)?;
            if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Invalid car number: {}", value),
                ));
            }
            engine.select_car(value as u32);
            serde_json::json!({"status": "focused", "selection": engine.selection()})
        }
        "clear_focus" => {
            engine.clear_selection();
            serde_json::json!({"status": "unfocused", "selection": engine.selection()})
        }
        "toggle_lock" => {
            engine.toggle_lock();
            serde_json::json!({"status": "lock_toggled", "selection": engine.selection()})
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Unknown action: {}", request.action),
            ))
        }
    };
    Ok(Json(reply))
}

async fn replay_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(scene) => match serde_json::to_string(&scene) {
                Ok(json) => Some(Ok(Event::default().data(json))),
                Err(e) => {
                    tracing::error!("Failed to serialize scene: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Scene stream lagged: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn replay_delete(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    runtime::stop(&state).await;

    {
        let mut engine = state.engine.write().await;
        if engine.year().is_none() && engine.session().is_none() {
            return Err((StatusCode::NOT_FOUND, "No active replay".to_string()));
        }
        engine.clear();
    }

    tracing::info!("Replay stopped and cleaned up");
    Ok(StatusCode::NO_CONTENT)
}
