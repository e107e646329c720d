//! Engine configuration
//!
//! Every knob has a default matching the tuned live behaviour; a config file
//! only needs to name the values it overrides.

use crate::camera::CameraConfig;
use crate::outline::OutlineConfig;
use crate::predictor::PredictorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Half-width of the location query window
    pub location_window_ms: i64,

    /// Half-width of the position query window
    pub position_window_ms: i64,

    /// Half-width of the lap query window (laps change slowly)
    pub lap_window_ms: i64,

    /// Query centers snap down to this bucket so repeats hit the cache
    pub slice_bucket_ms: i64,

    /// Clock positions inside one bucket share a fetch key
    pub dedup_bucket_ms: i64,

    /// Pause after an HTTP 429 before fetching or advancing again
    pub rate_limit_cooldown_ms: u64,

    /// Auto-play jump over an empty window, as a fraction of the session
    pub skip_ahead_fraction: f64,

    /// Initial playback speed multiplier
    pub default_speed: f64,

    pub predictor: PredictorConfig,
    pub outline: OutlineConfig,
    pub camera: CameraConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            location_window_ms: 650,
            position_window_ms: 1100,
            lap_window_ms: 12 * 60 * 1000,
            slice_bucket_ms: 2000,
            dedup_bucket_ms: 1000,
            rate_limit_cooldown_ms: 15_000,
            skip_ahead_fraction: 0.01,
            default_speed: 1.0,
            predictor: PredictorConfig::default(),
            outline: OutlineConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }
}
