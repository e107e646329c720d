//! Replay runtime
//!
//! This module handles:
//! - Loading a year's sessions and switching sessions
//! - The clock loop advancing auto-play
//! - The fetch loop turning clock positions into slice fetches, and
//!   retrying the roster until the session has one
//! - The render loop broadcasting scenes to subscribers
//!
//! All loops and in-flight fetches share one cancellation token. Starting
//! the runtime cancels the previous token first, so loops are never doubled.

use crate::state::AppState;
use ofr_core::engine::{CommitOutcome, FetchTicket, RosterTicket};
use ofr_core::model::Session;
use ofr_core::FetchError;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is not in the loaded year")]
    UnknownSession(u32),
}

/// Load the race sessions of `year`, resetting any replay in progress
pub async fn load_year(state: &AppState, year: i32) -> Result<Vec<Session>, FetchError> {
    stop(state).await;
    let epoch = state.engine.write().await.begin_year(year);
    info!("Loading {} sessions from {}", year, state.telemetry.name());

    match state.telemetry.race_sessions(year).await {
        Ok(sessions) => {
            let mut engine = state.engine.write().await;
            engine.commit_sessions(epoch, sessions);
            Ok(engine.sessions().to_vec())
        }
        Err(e) => {
            state.engine.write().await.fail_sessions(epoch, &e);
            Err(e)
        }
    }
}

/// Switch to a session of the loaded year and start the loops.
///
/// A roster failure leaves the session selected with an error banner; the
/// fetch loop keeps retrying it. The circuit overlay is optional; a geometry
/// miss only logs.
pub async fn select_session(
    state: &AppState,
    session_key: u32,
    circuit_id: Option<&str>,
) -> Result<Session, SessionError> {
    stop(state).await;
    let (epoch, session) = {
        let mut engine = state.engine.write().await;
        let epoch = engine
            .begin_session(session_key)
            .ok_or(SessionError::UnknownSession(session_key))?;
        let session = engine
            .session()
            .cloned()
            .ok_or(SessionError::UnknownSession(session_key))?;
        (epoch, session)
    };

    let roster = state.engine.write().await.next_roster(Instant::now());
    if let Some(ticket) = roster {
        load_roster(state, ticket).await;
    }

    if let Some(id) = circuit_id {
        match state.geometry.circuit_line(id).await {
            Ok(Some(coords)) => {
                state.engine.write().await.set_geometry(epoch, coords);
            }
            Ok(None) => info!("No circuit outline for {}, using telemetry shape", id),
            Err(e) => warn!("Circuit geometry unavailable: {}", e),
        }
    }

    start(state).await;
    Ok(session)
}

/// Start (or restart) the clock, fetch and render loops
pub async fn start(state: &AppState) {
    let token = {
        let mut cancel = state.runtime_cancel.write().await;
        if let Some(token) = cancel.take() {
            token.cancel();
        }
        let new_token = CancellationToken::new();
        *cancel = Some(new_token.clone());
        new_token
    };

    tokio::spawn(clock_loop(state.clone(), token.clone()));
    tokio::spawn(fetch_loop(state.clone(), token.clone()));
    tokio::spawn(render_loop(state.clone(), token));
    info!("Replay runtime started");
}

/// Cancel the loops and every in-flight fetch
pub async fn stop(state: &AppState) {
    let mut cancel = state.runtime_cancel.write().await;
    if let Some(token) = cancel.take() {
        token.cancel();
        info!("Replay runtime stopped");
    }
}

pub async fn is_running(state: &AppState) -> bool {
    state.runtime_cancel.read().await.is_some()
}

async fn clock_loop(state: AppState, cancel: CancellationToken) {
    let mut ticker = interval(state.runtime.clock_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        let elapsed = now - last;
        last = now;
        state.engine.write().await.tick_clock(elapsed, now);
    }
    debug!("Clock loop ended");
}

async fn fetch_loop(state: AppState, cancel: CancellationToken) {
    loop {
        let (roster, slice) = {
            let mut engine = state.engine.write().await;
            let now = Instant::now();
            (engine.next_roster(now), engine.next_fetch(now))
        };
        if let Some(ticket) = roster {
            let state = state.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = load_roster(&state, ticket) => {}
                }
            });
        }
        if let Some(ticket) = slice {
            tokio::spawn(fetch_slice(state.clone(), cancel.clone(), ticket));
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = state.fetch_wake.notified() => {}
            _ = sleep(state.runtime.fetch_interval()) => {}
        }
    }
    debug!("Fetch loop ended");
}

/// Fetch the roster and hand it back to the engine under its ticket
async fn load_roster(state: &AppState, ticket: RosterTicket) {
    let result = state.telemetry.roster(ticket.session_key).await;
    let mut engine = state.engine.write().await;
    let applied = match result {
        Ok(drivers) => engine.commit_roster(ticket.epoch, drivers),
        Err(e) => engine.fail_roster(ticket.epoch, &e, Instant::now()),
    };
    if !applied {
        debug!("Discarded roster for session {}", ticket.session_key);
    }
}

/// Fetch one slice and hand it back to the engine under its ticket
async fn fetch_slice(state: AppState, cancel: CancellationToken, ticket: FetchTicket) {
    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = state.telemetry.fetch_slice(&ticket.query) => result,
    };
    if cancel.is_cancelled() {
        return;
    }

    let mut engine = state.engine.write().await;
    let now = Instant::now();
    let outcome = match result {
        Ok(slice) => engine.commit_slice(&ticket, slice, now),
        Err(e) => engine.fail_slice(&ticket, &e, now),
    };
    if outcome == CommitOutcome::Stale {
        debug!("Discarded slice for {}", ticket.query.center);
    }
}

async fn render_loop(state: AppState, cancel: CancellationToken) {
    let mut ticker = interval(state.runtime.render_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let scene = state.engine.write().await.render(Instant::now());
        // No subscribers is fine; they get the next scene
        let _ = state.scene_tx.send(scene);
    }
    debug!("Render loop ended");
}
