//! Motion prediction and smoothing
//!
//! Telemetry arrives a few times per second at best, while the scene renders
//! at a fixed rate. Between observations each car is dead-reckoned along its
//! estimated progress velocity, and the rendered position eases toward that
//! target so corrections never teleport a dot.

use crate::model::CarNumber;
use crate::units::Progress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// What to do with a car that has not been observed for a while
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Keep dead-reckoning forever
    #[default]
    Extrapolate,
    /// Stop advancing once stale
    Freeze,
    /// Drop the car from the frame once stale
    Hide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Velocity clamp in laps per second at 1x playback
    pub max_velocity: f64,

    /// Weight of the previous velocity estimate in the EMA
    pub velocity_memory: f64,

    /// Time constant of the rendered-position easing
    pub smoothing_secs: f64,

    pub stale_policy: StalePolicy,

    /// Seconds without an observation before `stale_policy` applies.
    /// `None` never marks a car stale.
    pub stale_after_secs: Option<f64>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            max_velocity: 0.02,
            velocity_memory: 0.6,
            smoothing_secs: 0.35,
            stale_policy: StalePolicy::Extrapolate,
            stale_after_secs: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CarMotion {
    observed: Progress,
    observed_at: Instant,
    /// Extrapolation starts from `origin` at `anchor_at`. An observation
    /// resets it; holding playback pins it to the rendered position.
    origin: Progress,
    anchor_at: Instant,
    held: bool,
    velocity: f64,
    rendered: Progress,
    rendered_at: Instant,
}

#[derive(Debug, Clone)]
pub struct MotionPredictor {
    config: PredictorConfig,
    speed_scale: f64,
    cars: BTreeMap<CarNumber, CarMotion>,
}

impl MotionPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            speed_scale: 1.0,
            cars: BTreeMap::new(),
        }
    }

    /// Playback speed multiplier. Progress per wall-clock second grows with
    /// it, so the velocity clamp does too.
    pub fn set_speed_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.speed_scale = scale;
        }
    }

    fn velocity_limit(&self) -> f64 {
        self.config.max_velocity * self.speed_scale
    }

    /// Record a fresh progress observation for `car`
    pub fn observe(&mut self, car: CarNumber, progress: Progress, now: Instant) {
        let limit = self.velocity_limit();
        let memory = self.config.velocity_memory.clamp(0.0, 1.0);

        match self.cars.get_mut(&car) {
            None => {
                self.cars.insert(
                    car,
                    CarMotion {
                        observed: progress,
                        observed_at: now,
                        origin: progress,
                        anchor_at: now,
                        held: false,
                        velocity: 0.0,
                        rendered: progress,
                        rendered_at: now,
                    },
                );
            }
            Some(m) => {
                let dt = now.saturating_duration_since(m.observed_at).as_secs_f64();
                if dt > 0.0 {
                    let instant = (m.observed.diff_to(progress) / dt).clamp(-limit, limit);
                    m.velocity = memory * m.velocity + (1.0 - memory) * instant;
                }
                m.observed = progress;
                m.observed_at = now;
                m.origin = progress;
                m.anchor_at = now;
            }
        }
    }

    /// Freeze extrapolation at `now` without losing velocity estimates.
    /// Called on every frame while playback is not advancing. The first
    /// call pins each car where it is drawn, so dots never ease backwards;
    /// observations made while held still move them.
    pub fn hold(&mut self, now: Instant) {
        for m in self.cars.values_mut() {
            if !m.held {
                m.origin = m.rendered;
                m.held = true;
            }
            m.anchor_at = now;
        }
    }

    fn target(&self, m: &CarMotion, now: Instant, extrapolate: bool) -> Option<Progress> {
        if !extrapolate {
            return Some(m.origin);
        }
        let mut elapsed = now.saturating_duration_since(m.anchor_at).as_secs_f64();

        if let Some(after) = self.config.stale_after_secs {
            let age = now.saturating_duration_since(m.observed_at).as_secs_f64();
            if age > after {
                match self.config.stale_policy {
                    StalePolicy::Extrapolate => {}
                    StalePolicy::Freeze => {
                        let since_anchor = m.anchor_at.saturating_duration_since(m.observed_at);
                        elapsed = (after - since_anchor.as_secs_f64()).max(0.0);
                    }
                    StalePolicy::Hide => return None,
                }
            }
        }

        Some(m.origin.wrapping_add(m.velocity * elapsed))
    }

    /// Advance every car's rendered position to `now` and return them in car
    /// order. `extrapolate` is false while playback is not moving.
    pub fn frame(&mut self, now: Instant, extrapolate: bool) -> Vec<(CarNumber, Progress)> {
        let tau = self.config.smoothing_secs;
        let targets: Vec<(CarNumber, Option<Progress>)> = self
            .cars
            .iter()
            .map(|(car, m)| (*car, self.target(m, now, extrapolate)))
            .collect();

        let mut out = Vec::with_capacity(targets.len());
        for (car, target) in targets {
            let Some(target) = target else { continue };
            let Some(m) = self.cars.get_mut(&car) else { continue };

            let dt = now.saturating_duration_since(m.rendered_at).as_secs_f64();
            m.rendered = if tau <= 0.0 {
                target
            } else {
                let alpha = 1.0 - (-dt / tau).exp();
                m.rendered.wrapping_add(m.rendered.diff_to(target) * alpha)
            };
            m.rendered_at = now;
            if extrapolate {
                m.held = false;
            }
            out.push((car, m.rendered));
        }
        out
    }

    pub fn rendered(&self, car: CarNumber) -> Option<Progress> {
        self.cars.get(&car).map(|m| m.rendered)
    }

    pub fn velocity(&self, car: CarNumber) -> Option<f64> {
        self.cars.get(&car).map(|m| m.velocity)
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    pub fn reset(&mut self) {
        self.cars.clear();
    }
}

impl Default for MotionPredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn unsmoothed() -> MotionPredictor {
        MotionPredictor::new(PredictorConfig {
            smoothing_secs: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_first_observation_renders_in_place() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(44, Progress::new(0.3), t0);
        let frame = p.frame(t0, true);
        assert_eq!(frame, vec![(44, Progress::new(0.3))]);
        assert_eq!(p.velocity(44), Some(0.0));
    }

    #[test]
    fn test_velocity_is_blended() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        let v = p.velocity(1).unwrap();
        assert!((v - 0.004).abs() < 1e-12, "got {}", v);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.3), t0 + secs(1.0));
        let v = p.velocity(1).unwrap();
        assert!((v - 0.008).abs() < 1e-12, "got {}", v);
    }

    #[test]
    fn test_velocity_clamp_scales_with_speed() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.set_speed_scale(4.0);
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.3), t0 + secs(1.0));
        let v = p.velocity(1).unwrap();
        assert!((v - 0.032).abs() < 1e-12, "got {}", v);
    }

    #[test]
    fn test_crossing_the_line_is_forward_motion() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.99), t0);
        p.observe(1, Progress::new(0.005), t0 + secs(1.0));
        assert!(p.velocity(1).unwrap() > 0.0);
    }

    #[test]
    fn test_extrapolates_between_observations() {
        let t0 = Instant::now();
        let mut p = unsmoothed();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        let frame = p.frame(t0 + secs(3.0), true);
        // 0.01 + 0.004 * 2
        assert!((frame[0].1.value() - 0.018).abs() < 1e-9);
    }

    #[test]
    fn test_no_extrapolation_when_held() {
        let t0 = Instant::now();
        let mut p = unsmoothed();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        let frame = p.frame(t0 + secs(30.0), false);
        assert!((frame[0].1.value() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_hold_restarts_extrapolation_from_now() {
        let t0 = Instant::now();
        let mut p = unsmoothed();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        p.frame(t0 + secs(1.0), true);
        p.hold(t0 + secs(10.0));
        let frame = p.frame(t0 + secs(11.0), true);
        assert!((frame[0].1.value() - 0.014).abs() < 1e-9);
    }

    #[test]
    fn test_pause_freezes_dots_where_drawn() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        let drawn = p.frame(t0 + secs(3.0), true)[0].1.value();
        assert!(drawn > 0.01, "extrapolated ahead of the observation: {}", drawn);

        for step in 1..=20 {
            let now = t0 + secs(3.0 + step as f64 * 0.05);
            p.hold(now);
            let r = p.frame(now, false)[0].1.value();
            assert!((r - drawn).abs() < 1e-12, "moved while paused: {} -> {}", drawn, r);
        }
    }

    #[test]
    fn test_observation_while_held_moves_the_dot() {
        let t0 = Instant::now();
        let mut p = unsmoothed();
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        p.frame(t0 + secs(3.0), true);
        p.hold(t0 + secs(3.0));

        // A scrub lands a new sample; later holds must not undo it
        p.observe(1, Progress::new(0.5), t0 + secs(4.0));
        p.hold(t0 + secs(4.0));
        let r = p.frame(t0 + secs(4.0), false)[0].1.value();
        assert!((r - 0.5).abs() < 1e-12, "got {}", r);
    }

    #[test]
    fn test_smoothing_eases_toward_target() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.10), t0);
        p.frame(t0, true);
        p.observe(1, Progress::new(0.12), t0 + secs(0.1));
        let r = p.frame(t0 + secs(0.1), false)[0].1.value();
        assert!(r > 0.10 && r < 0.12, "got {}", r);

        let r = p.frame(t0 + secs(5.0), false)[0].1.value();
        assert!((r - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_takes_shortest_way_round() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.98), t0);
        p.observe(1, Progress::new(0.02), t0 + secs(0.2));
        let r = p.frame(t0 + secs(0.2), false)[0].1.value();
        assert!(r > 0.98 || r < 0.02, "went the long way: {}", r);
    }

    #[test]
    fn test_stale_hide() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::new(PredictorConfig {
            stale_policy: StalePolicy::Hide,
            stale_after_secs: Some(5.0),
            ..Default::default()
        });
        p.observe(1, Progress::new(0.2), t0);
        p.observe(2, Progress::new(0.4), t0 + secs(8.0));
        let frame = p.frame(t0 + secs(8.0), true);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].0, 2);
    }

    #[test]
    fn test_stale_freeze_stops_advancing() {
        let t0 = Instant::now();
        let mut p = MotionPredictor::new(PredictorConfig {
            smoothing_secs: 0.0,
            stale_policy: StalePolicy::Freeze,
            stale_after_secs: Some(2.0),
            ..Default::default()
        });
        p.observe(1, Progress::new(0.0), t0);
        p.observe(1, Progress::new(0.01), t0 + secs(1.0));
        let a = p.frame(t0 + secs(10.0), true)[0].1.value();
        let b = p.frame(t0 + secs(20.0), true)[0].1.value();
        assert!((a - 0.018).abs() < 1e-9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset() {
        let mut p = MotionPredictor::default();
        p.observe(1, Progress::new(0.2), Instant::now());
        assert_eq!(p.len(), 1);
        p.reset();
        assert!(p.is_empty());
        assert!(p.rendered(1).is_none());
    }
}
