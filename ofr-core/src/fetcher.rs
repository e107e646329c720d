//! Slice query planning, dedup and rate-limit gating
//!
//! The network call itself lives behind [`crate::source::TelemetrySource`];
//! this module decides *whether* and *what* to fetch.

use crate::config::EngineConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::{Duration, Instant};

/// Inclusive time window `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn around(center: DateTime<Utc>, half_width_ms: i64) -> Self {
        let half = ChronoDuration::milliseconds(half_width_ms.max(0));
        Self {
            from: center - half,
            to: center + half,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts <= self.to
    }
}

/// Snap an instant down to a multiple of `bucket_ms` since the epoch
pub fn snap_to_bucket(ts: DateTime<Utc>, bucket_ms: i64) -> DateTime<Utc> {
    if bucket_ms <= 0 {
        return ts;
    }
    let ms = ts.timestamp_millis();
    let snapped = ms - ms.rem_euclid(bucket_ms);
    DateTime::<Utc>::from_timestamp_millis(snapped).unwrap_or(ts)
}

/// Everything one slice fetch needs
#[derive(Debug, Clone, PartialEq)]
pub struct SliceQuery {
    pub session_key: u32,
    pub center: DateTime<Utc>,
    pub locations: TimeWindow,
    pub positions: TimeWindow,
    pub laps: TimeWindow,
}

impl SliceQuery {
    /// Build the three windows around the bucketed clock instant
    pub fn plan(session_key: u32, at: DateTime<Utc>, config: &EngineConfig) -> Self {
        let center = snap_to_bucket(at, config.slice_bucket_ms);
        Self {
            session_key,
            center,
            locations: TimeWindow::around(center, config.location_window_ms),
            positions: TimeWindow::around(center, config.position_window_ms),
            laps: TimeWindow::around(center, config.lap_window_ms),
        }
    }
}

/// Dedup key: session plus the clock instant quantized to the dedup bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub session_key: u32,
    pub bucket: i64,
}

impl FetchKey {
    pub fn new(session_key: u32, at: DateTime<Utc>, bucket_ms: i64) -> Self {
        let bucket_ms = bucket_ms.max(1);
        Self {
            session_key,
            bucket: at.timestamp_millis().div_euclid(bucket_ms),
        }
    }
}

/// Decides whether a fetch may go out right now
#[derive(Debug, Default)]
pub struct FetchGate {
    last_key: Option<FetchKey>,
    cooldown_until: Option<Instant>,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a fetch for `key` should be issued. Records the key when it does.
    pub fn should_fetch(&mut self, key: FetchKey, now: Instant) -> bool {
        if self.in_cooldown(now) {
            return false;
        }
        if self.last_key == Some(key) {
            return false;
        }
        self.last_key = Some(key);
        true
    }

    pub fn last_key(&self) -> Option<FetchKey> {
        self.last_key
    }

    /// Enter the rate-limit cooldown
    pub fn trip_rate_limit(&mut self, now: Instant, cooldown: Duration) {
        self.cooldown_until = Some(now + cooldown);
        // The window that was refused must be asked for again afterwards
        self.last_key = None;
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        match self.cooldown_until {
            Some(until) if now < until => Some(until - now),
            _ => None,
        }
    }

    /// Clear an elapsed cooldown. Returns true if one just ended.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) if now >= until => {
                self.cooldown_until = None;
                true
            }
            _ => false,
        }
    }

    /// Let the next poll retry the same window after a failure
    pub fn forget_last_key(&mut self) {
        self.last_key = None;
    }

    pub fn reset(&mut self) {
        self.last_key = None;
        self.cooldown_until = None;
    }
}

/// Whole seconds until the cooldown ends, rounded up
pub fn retry_in_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
