//! Replay engine
//!
//! Owns every piece of per-session replay state and is the only place it is
//! mutated. The engine itself never awaits: async callers ask for a
//! [`FetchTicket`], perform the network call without holding any lock, and
//! hand the ticket back together with the result. Tickets carry the epoch
//! (bumped on every year or session change) and a sequence number, so late
//! completions from an abandoned session or an overtaken window are dropped.

use crate::camera::{fit_overlay, CameraController, CameraSources, Selection};
use crate::clock::{format_time_label, time_at, PlaybackState, SessionClock};
use crate::config::EngineConfig;
use crate::error::FetchError;
use crate::fetcher::{retry_in_secs, FetchGate, FetchKey, SliceQuery};
use crate::model::{
    latest_per_car, CarNumber, Driver, Lap, PositionSample, Session, Slice, TrackPoint,
};
use crate::outline::TrackOutlineAccumulator;
use crate::predictor::MotionPredictor;
use crate::progress::{map_progress, project, ProgressFrame, TrackProjector};
use crate::scene::{
    Banner, CarDot, FocusPanel, OrderRow, PlaybackInfo, Scene, SceneSession, TrackLayer,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Permission to perform one slice fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub epoch: u64,
    pub seq: u64,
    pub key: FetchKey,
    pub query: SliceQuery,
}

/// Permission to (re)load the roster of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterTicket {
    pub epoch: u64,
    pub session_key: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RosterStatus {
    Missing,
    Requested,
    Loaded,
}

/// What happened to a slice handed back to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// No location or position data; auto-play skipped ahead
    SkippedEmpty,
    Failed,
    /// Ticket belongs to an old session or was overtaken
    Stale,
}

#[derive(Debug)]
pub struct ReplayEngine {
    config: EngineConfig,
    epoch: u64,
    next_seq: u64,
    committed_seq: u64,

    year: Option<i32>,
    sessions: Vec<Session>,
    session: Option<Session>,
    roster: BTreeMap<CarNumber, Driver>,
    roster_status: RosterStatus,
    roster_error: Option<String>,

    clock: SessionClock,
    gate: FetchGate,
    slice: Slice,
    positions: BTreeMap<CarNumber, PositionSample>,
    laps: BTreeMap<CarNumber, Lap>,
    last_seen: BTreeMap<CarNumber, DateTime<Utc>>,

    frame: Option<ProgressFrame>,
    projector: TrackProjector,
    predictor: MotionPredictor,
    outline: TrackOutlineAccumulator,
    camera: CameraController,
    selection: Selection,

    geometry: Option<Vec<[f64; 2]>>,
    overlay: Vec<TrackPoint>,
    overlay_fitted: bool,

    error: Option<String>,
}

impl ReplayEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            clock: SessionClock::new(config.default_speed),
            predictor: MotionPredictor::new(config.predictor.clone()),
            outline: TrackOutlineAccumulator::new(config.outline.clone()),
            camera: CameraController::new(config.camera.clone()),
            config,
            epoch: 0,
            next_seq: 0,
            committed_seq: 0,
            year: None,
            sessions: Vec::new(),
            session: None,
            roster: BTreeMap::new(),
            roster_status: RosterStatus::Missing,
            roster_error: None,
            gate: FetchGate::new(),
            slice: Slice::default(),
            positions: BTreeMap::new(),
            laps: BTreeMap::new(),
            last_seen: BTreeMap::new(),
            frame: None,
            projector: TrackProjector::default(),
            selection: Selection::default(),
            geometry: None,
            overlay: Vec::new(),
            overlay_fitted: false,
            error: None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ---- year / session lifecycle ----

    /// Drop the current year and everything derived from it. Returns the
    /// epoch the session list must be committed under.
    pub fn begin_year(&mut self, year: i32) -> u64 {
        self.bump_epoch();
        self.reset_session_state();
        self.year = Some(year);
        self.sessions.clear();
        self.session = None;
        self.roster.clear();
        info!("Loading sessions for {}", year);
        self.epoch
    }

    pub fn commit_sessions(&mut self, epoch: u64, mut sessions: Vec<Session>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        sessions.sort_by_key(|s| s.date_start);
        info!("{} race sessions available", sessions.len());
        self.sessions = sessions;
        true
    }

    pub fn fail_sessions(&mut self, epoch: u64, err: &FetchError) -> bool {
        if epoch != self.epoch {
            return false;
        }
        warn!("Failed to load sessions: {}", err);
        self.error = Some(format!("Failed to load sessions: {}", err));
        true
    }

    /// Switch to a session from the loaded list. Returns the new epoch, or
    /// `None` if the key is unknown.
    pub fn begin_session(&mut self, session_key: u32) -> Option<u64> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.session_key == session_key)
            .cloned()?;
        Some(self.begin_session_with(session))
    }

    /// Switch to an explicit session, bypassing the year list
    pub fn begin_session_with(&mut self, session: Session) -> u64 {
        self.bump_epoch();
        self.reset_session_state();
        info!(
            "Session {} selected: {}",
            session.session_key,
            session.label()
        );
        self.session = Some(session);
        self.roster.clear();
        self.epoch
    }

    /// Ticket for loading the roster while the session has none. Only one
    /// request is out at a time, and none is issued during a 429 cooldown.
    pub fn next_roster(&mut self, now: Instant) -> Option<RosterTicket> {
        let session = self.session.as_ref()?;
        if self.roster_status != RosterStatus::Missing || self.gate.in_cooldown(now) {
            return None;
        }
        self.roster_status = RosterStatus::Requested;
        Some(RosterTicket {
            epoch: self.epoch,
            session_key: session.session_key,
        })
    }

    pub fn commit_roster(&mut self, epoch: u64, drivers: Vec<Driver>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.roster = drivers
            .into_iter()
            .map(|d| (d.driver_number, d))
            .collect();
        self.roster_status = RosterStatus::Loaded;
        self.roster_error = None;
        debug!("Roster has {} drivers", self.roster.len());
        true
    }

    /// Record a failed roster request. The next [`Self::next_roster`] call
    /// retries it, after the cooldown if the feed answered 429.
    pub fn fail_roster(&mut self, epoch: u64, err: &FetchError, now: Instant) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.roster_status = RosterStatus::Missing;
        if err.is_rate_limited() {
            let cooldown = self.config.rate_limit_cooldown();
            warn!("Rate limited loading drivers, retrying in {}s", cooldown.as_secs());
            self.gate.trip_rate_limit(now, cooldown);
        } else {
            warn!("Failed to load roster: {}", err);
            self.roster_error = Some(format!("Failed to load drivers: {}", err));
        }
        true
    }

    pub fn has_roster(&self) -> bool {
        self.roster_status == RosterStatus::Loaded
    }

    /// Circuit geometry (lon/lat) for the current session
    pub fn set_geometry(&mut self, epoch: u64, coords: Vec<[f64; 2]>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.geometry = Some(coords);
        self.overlay.clear();
        self.overlay_fitted = false;
        true
    }

    /// Stop everything and forget the year
    pub fn clear(&mut self) {
        self.bump_epoch();
        self.reset_session_state();
        self.year = None;
        self.sessions.clear();
        self.session = None;
        self.roster.clear();
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
        // In-flight tickets of the old epoch can never commit
        self.committed_seq = self.next_seq;
    }

    fn reset_session_state(&mut self) {
        self.clock.reset();
        self.gate.reset();
        self.slice = Slice::default();
        self.positions.clear();
        self.laps.clear();
        self.last_seen.clear();
        self.frame = None;
        self.projector = TrackProjector::default();
        self.predictor.reset();
        self.outline.reset();
        self.camera.reset();
        self.selection.clear();
        self.geometry = None;
        self.overlay.clear();
        self.overlay_fitted = false;
        self.error = None;
        self.roster_status = RosterStatus::Missing;
        self.roster_error = None;
    }

    // ---- clock ----

    /// Advance auto-play by `elapsed`. Suspended while rate limited; the
    /// cooldown ending resumes it with no user action.
    pub fn tick_clock(&mut self, elapsed: Duration, now: Instant) -> bool {
        if self.gate.expire(now) {
            info!("Rate limit cooldown over, resuming");
        }
        if self.gate.in_cooldown(now) {
            return false;
        }
        let Some(session) = &self.session else {
            return false;
        };
        self.clock.advance(elapsed, session.duration())
    }

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn begin_scrub(&mut self) {
        self.clock.begin_scrub();
    }

    pub fn scrub_to(&mut self, t: f64) {
        self.clock.scrub_to(t);
    }

    pub fn end_scrub(&mut self) {
        self.clock.end_scrub();
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.clock.set_speed(speed);
        self.predictor.set_speed_scale(self.clock.speed());
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Session instant at the current clock position
    pub fn current_time(&self) -> Option<DateTime<Utc>> {
        self.session
            .as_ref()
            .map(|s| time_at(s, self.clock.position()))
    }

    // ---- fetching ----

    /// Ticket for the slice at the current clock position, unless it was
    /// already requested or the engine is cooling down
    pub fn next_fetch(&mut self, now: Instant) -> Option<FetchTicket> {
        let session = self.session.as_ref()?;
        let at = time_at(session, self.clock.position());
        let key = FetchKey::new(session.session_key, at, self.config.dedup_bucket_ms);
        if !self.gate.should_fetch(key, now) {
            return None;
        }
        self.next_seq += 1;
        Some(FetchTicket {
            epoch: self.epoch,
            seq: self.next_seq,
            key,
            query: SliceQuery::plan(session.session_key, at, &self.config),
        })
    }

    fn accept(&mut self, ticket: &FetchTicket) -> bool {
        if ticket.epoch != self.epoch || ticket.seq <= self.committed_seq {
            debug!(
                "Dropping stale slice (epoch {} seq {})",
                ticket.epoch, ticket.seq
            );
            return false;
        }
        self.committed_seq = ticket.seq;
        true
    }

    pub fn commit_slice(&mut self, ticket: &FetchTicket, slice: Slice, now: Instant) -> CommitOutcome {
        if !self.accept(ticket) {
            return CommitOutcome::Stale;
        }
        self.error = None;

        if slice.is_empty() {
            if self.clock.is_auto_playing() {
                self.clock.skip_ahead(self.config.skip_ahead_fraction);
                debug!("Empty window, skipping ahead to {:.4}", self.clock.position());
            }
            return CommitOutcome::SkippedEmpty;
        }

        self.outline.accumulate(&slice.locations);

        if let Some((frame, per_car)) = map_progress(&slice.locations) {
            self.projector = TrackProjector::new(&frame, self.outline.outline());
            self.frame = Some(frame);
            for (car, progress) in per_car {
                self.predictor.observe(car, progress, now);
            }
        }

        for (car, sample) in latest_per_car(&slice.locations) {
            self.last_seen.insert(car, sample.date);
        }
        if !slice.positions.is_empty() {
            self.positions = latest_per_car(&slice.positions);
        }
        if !slice.laps.is_empty() {
            self.laps = latest_per_car(&slice.laps);
        }

        self.slice = slice;
        CommitOutcome::Applied
    }

    pub fn fail_slice(&mut self, ticket: &FetchTicket, err: &FetchError, now: Instant) -> CommitOutcome {
        if !self.accept(ticket) {
            return CommitOutcome::Stale;
        }
        if err.is_rate_limited() {
            let cooldown = self.config.rate_limit_cooldown();
            warn!("Rate limited, pausing fetches for {}s", cooldown.as_secs());
            self.gate.trip_rate_limit(now, cooldown);
        } else {
            warn!("Slice fetch failed: {}", err);
            self.error = Some(format!("Telemetry unavailable: {}", err));
            if self.gate.last_key() == Some(ticket.key) {
                self.gate.forget_last_key();
            }
        }
        CommitOutcome::Failed
    }

    pub fn is_rate_limited(&self, now: Instant) -> bool {
        self.gate.in_cooldown(now)
    }

    pub fn banner(&self, now: Instant) -> Option<Banner> {
        if let Some(remaining) = self.gate.cooldown_remaining(now) {
            return Some(Banner::RateLimited {
                retry_in_secs: retry_in_secs(remaining),
            });
        }
        self.error
            .clone()
            .or_else(|| self.roster_error.clone())
            .map(|message| Banner::Error { message })
    }

    // ---- selection ----

    pub fn select_car(&mut self, car: CarNumber) {
        self.selection.select(car);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn toggle_lock(&mut self) {
        self.selection.toggle_lock();
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    // ---- introspection ----

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn roster(&self) -> &BTreeMap<CarNumber, Driver> {
        &self.roster
    }

    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    pub fn outline(&self) -> &TrackOutlineAccumulator {
        &self.outline
    }

    pub fn predictor(&self) -> &MotionPredictor {
        &self.predictor
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn overlay(&self) -> &[TrackPoint] {
        &self.overlay
    }

    // ---- rendering ----

    /// Compute the frame at `now`. Advances the predictor's smoothing and
    /// folds this frame's shapes into the camera.
    pub fn render(&mut self, now: Instant) -> Scene {
        let extrapolate = self.clock.is_auto_playing() && !self.gate.in_cooldown(now);
        if !extrapolate {
            self.predictor.hold(now);
        }
        let progress = self.predictor.frame(now, extrapolate);

        let positions: Vec<(CarNumber, TrackPoint)> = match &self.frame {
            Some(frame) => progress
                .into_iter()
                .map(|(car, s)| (car, project(frame, &self.projector, s)))
                .collect(),
            None => Vec::new(),
        };

        let focused = self.selection.focused_car();
        let cars: Vec<CarDot> = positions
            .iter()
            .filter_map(|(car, p)| {
                let d = self.roster.get(car)?;
                let is_focused = focused == Some(*car);
                Some(CarDot {
                    driver_number: *car,
                    acronym: d.name_acronym.clone(),
                    full_name: d.full_name.clone(),
                    team: d.team_name.clone(),
                    colour: d.colour(),
                    x: p.x,
                    y: p.y,
                    focused: is_focused,
                    dimmed: focused.is_some() && !is_focused,
                })
            })
            .collect();

        let outline = self.outline.outline().to_vec();
        let cloud: Vec<TrackPoint> = self.slice.locations.iter().map(|s| s.point()).collect();
        let dots: Vec<TrackPoint> = cars.iter().map(|c| TrackPoint::new(c.x, c.y)).collect();

        let stable = self.camera.update(&CameraSources {
            overlay: &self.overlay,
            outline: &outline,
            cloud: &cloud,
            dots: &dots,
        });

        if !self.overlay_fitted {
            if let (Some(geo), Some(bounds)) = (&self.geometry, stable) {
                self.overlay = fit_overlay(geo, &bounds);
                self.overlay_fitted = true;
                debug!("Fitted {} overlay points", self.overlay.len());
            }
        }

        let lock_target = match self.selection {
            Selection::FocusedLocked(car) => cars
                .iter()
                .find(|c| c.driver_number == car)
                .map(|c| TrackPoint::new(c.x, c.y)),
            _ => None,
        };
        let viewport = self.camera.viewport(lock_target);

        let track = TrackLayer {
            overlay: self.overlay.clone(),
            cloud: if outline.len() >= TrackProjector::MIN_POINTS {
                Vec::new()
            } else {
                cloud
            },
            outline,
        };

        Scene {
            session: self.session.as_ref().map(|s| SceneSession {
                session_key: s.session_key,
                label: s.label(),
            }),
            viewport,
            track,
            cars,
            playback: self.playback_info(),
            banner: self.banner(now),
            order: self.order_rows(),
            focus: self.focus_panel(),
        }
    }

    fn playback_info(&self) -> PlaybackInfo {
        let time = self.current_time();
        PlaybackInfo {
            t: self.clock.position(),
            state: self.clock.state(),
            speed: self.clock.speed(),
            time,
            time_label: time.map(format_time_label),
        }
    }

    /// Running order from the latest position samples, roster matches only
    fn order_rows(&self) -> Vec<OrderRow> {
        let mut rows: Vec<OrderRow> = self
            .positions
            .values()
            .filter_map(|p| {
                let d = self.roster.get(&p.driver_number)?;
                Some(OrderRow {
                    position: p.position,
                    driver_number: p.driver_number,
                    acronym: d.name_acronym.clone(),
                    full_name: d.full_name.clone(),
                    team: d.team_name.clone(),
                    colour: d.colour(),
                    lap: self.laps.get(&p.driver_number).map(|l| l.lap_number),
                })
            })
            .collect();
        rows.sort_by_key(|r| r.position);
        rows
    }

    fn focus_panel(&self) -> Option<FocusPanel> {
        let car = self.selection.focused_car()?;
        let d = self.roster.get(&car)?;
        Some(FocusPanel {
            driver_number: car,
            acronym: d.name_acronym.clone(),
            full_name: d.full_name.clone(),
            team: d.team_name.clone(),
            colour: d.colour(),
            position: self.positions.get(&car).map(|p| p.position),
            lap: self.laps.get(&car).map(|l| l.lap_number),
            last_update: self.last_seen.get(&car).copied(),
            locked: self.selection.is_locked(),
        })
    }

    /// Playback state for status endpoints
    pub fn playback_state(&self) -> PlaybackState {
        self.clock.state()
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
