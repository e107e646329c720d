//! Session clock
//!
//! Maps a normalized replay position `t` in `[0, 1]` to an instant inside a
//! session window, and owns the playback state machine:
//!
//! - `AutoPlay` advances `t` with wall-clock time times the speed multiplier
//!   and loops from 1 back to 0.
//! - `Scrubbing` is entered on pointer-down and suspends auto-play at once.
//! - `Paused` is where scrubbing ends. Only an explicit `play()` resumes.

use crate::model::Session;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 16.0;

/// Instant at normalized position `t` (clamped to `[0, 1]`)
pub fn time_at(session: &Session, t: f64) -> DateTime<Utc> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let span = session.duration().num_nanoseconds().unwrap_or(0);
    let offset = (span as f64 * t).round() as i64;
    session.date_start + ChronoDuration::nanoseconds(offset)
}

/// Human-readable label for the clock position
pub fn format_time_label(ts: DateTime<Utc>) -> String {
    ts.format("%a %d %b %Y %H:%M:%S UTC").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    AutoPlay,
    Scrubbing,
    Paused,
}

/// Replay position plus playback state
#[derive(Debug, Clone)]
pub struct SessionClock {
    t: f64,
    speed: f64,
    state: PlaybackState,
}

impl SessionClock {
    pub fn new(speed: f64) -> Self {
        Self {
            t: 0.0,
            speed: speed.clamp(MIN_SPEED, MAX_SPEED),
            state: PlaybackState::AutoPlay,
        }
    }

    pub fn position(&self) -> f64 {
        self.t
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_auto_playing(&self) -> bool {
        self.state == PlaybackState::AutoPlay
    }

    pub fn play(&mut self) {
        self.state = PlaybackState::AutoPlay;
    }

    pub fn pause(&mut self) {
        self.state = PlaybackState::Paused;
    }

    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() {
            self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        }
    }

    /// Pointer-down on the scrub control
    pub fn begin_scrub(&mut self) {
        self.state = PlaybackState::Scrubbing;
    }

    /// Move to `t`. Seeking while auto-playing counts as a scrub.
    pub fn scrub_to(&mut self, t: f64) {
        if self.state == PlaybackState::AutoPlay {
            self.state = PlaybackState::Scrubbing;
        }
        if t.is_finite() {
            self.t = t.clamp(0.0, 1.0);
        }
    }

    /// Pointer-up. Never resumes auto-play by itself.
    pub fn end_scrub(&mut self) {
        if self.state == PlaybackState::Scrubbing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Advance by `elapsed` wall-clock time over a session of length
    /// `session`. Returns true if the position moved.
    pub fn advance(&mut self, elapsed: Duration, session: ChronoDuration) -> bool {
        if self.state != PlaybackState::AutoPlay {
            return false;
        }
        let total = session.num_milliseconds() as f64 / 1000.0;
        if total <= 0.0 {
            return false;
        }
        let dt = elapsed.as_secs_f64() * self.speed / total;
        if dt <= 0.0 {
            return false;
        }
        self.t = (self.t + dt) % 1.0;
        true
    }

    /// Jump ahead over a telemetry gap, never past the end
    pub fn skip_ahead(&mut self, fraction: f64) {
        self.t = (self.t + fraction).min(1.0);
    }

    /// Back to the start of the session. A pending scrub is abandoned.
    pub fn reset(&mut self) {
        self.t = 0.0;
        if self.state == PlaybackState::Scrubbing {
            self.state = PlaybackState::Paused;
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}
