//! Track progress mapping
//!
//! Converts raw planar telemetry into a normalized progress value per car,
//! without knowing the real track geometry: the angle of each point around
//! the center of the batch bounding box, after normalizing both axes to the
//! unit square, is read as "how far around the lap" the car is.
//!
//! This is an approximation. On elongated or non-convex circuits the angle
//! does not advance uniformly with distance, and hairpins that fold back
//! across the center can make progress run backwards briefly.

use crate::model::{latest_per_car, CarNumber, LocationSample, TrackPoint};
use crate::units::Progress;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Normalization frame derived from one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressFrame {
    pub cx: f64,
    pub cy: f64,
    pub half_w: f64,
    pub half_h: f64,
}

impl ProgressFrame {
    /// Frame of the finite points' bounding box. `None` if either axis is
    /// degenerate (fewer than two distinct values).
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = TrackPoint>,
    {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for p in points {
            if !p.x.is_finite() || !p.y.is_finite() {
                continue;
            }
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }

        if !(min_x < max_x && min_y < max_y) {
            return None;
        }

        Some(Self {
            cx: (min_x + max_x) / 2.0,
            cy: (min_y + max_y) / 2.0,
            half_w: (max_x - min_x) / 2.0,
            half_h: (max_y - min_y) / 2.0,
        })
    }

    pub fn progress_of(&self, p: TrackPoint) -> Progress {
        let nx = (p.x - self.cx) / self.half_w;
        let ny = (p.y - self.cy) / self.half_h;
        Progress::new((ny.atan2(nx) + PI) / (2.0 * PI))
    }

    /// Point on the inscribed ellipse at progress `s`
    pub fn ellipse_point(&self, s: Progress) -> TrackPoint {
        let angle = s.value() * 2.0 * PI - PI;
        TrackPoint::new(
            self.cx + angle.cos() * self.half_w,
            self.cy + angle.sin() * self.half_h,
        )
    }
}

/// Progress of every car in the batch, from each car's latest sample
pub fn map_progress(
    samples: &[LocationSample],
) -> Option<(ProgressFrame, BTreeMap<CarNumber, Progress>)> {
    let frame = ProgressFrame::from_points(samples.iter().map(LocationSample::point))?;
    let per_car = latest_per_car(samples)
        .into_iter()
        .filter(|(_, s)| s.is_finite())
        .map(|(car, s)| (car, frame.progress_of(s.point())))
        .collect();
    Some((frame, per_car))
}

/// Places a progress value back on the traced outline
#[derive(Debug, Clone, Default)]
pub struct TrackProjector {
    table: Vec<(f64, TrackPoint)>,
}

impl TrackProjector {
    /// Minimum outline length worth projecting onto
    pub const MIN_POINTS: usize = 10;

    pub fn new(frame: &ProgressFrame, outline: &[TrackPoint]) -> Self {
        if outline.len() < Self::MIN_POINTS {
            return Self::default();
        }
        let mut table: Vec<(f64, TrackPoint)> = outline
            .iter()
            .map(|p| (frame.progress_of(*p).value(), *p))
            .collect();
        table.sort_by(|a, b| a.0.total_cmp(&b.0));
        table.dedup_by(|a, b| a.0 == b.0);
        Self { table }
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() < 2
    }

    /// Interpolate between the two outline points bracketing `s`, wrapping
    /// from the last entry back to the first
    pub fn locate(&self, s: Progress) -> Option<TrackPoint> {
        if self.is_empty() {
            return None;
        }
        let v = s.value();
        let n = self.table.len();
        let upper = self.table.partition_point(|(p, _)| *p <= v);

        let (lo, hi) = if upper == 0 || upper == n {
            (self.table[n - 1], self.table[0])
        } else {
            (self.table[upper - 1], self.table[upper])
        };

        let span = crate::units::wrap01(hi.0 - lo.0);
        if span <= 0.0 {
            return Some(lo.1);
        }
        let t = crate::units::wrap01(v - lo.0) / span;
        Some(lo.1.lerp(hi.1, t.clamp(0.0, 1.0)))
    }
}

/// Progress to planar position: outline when available, ellipse otherwise
pub fn project(frame: &ProgressFrame, projector: &TrackProjector, s: Progress) -> TrackPoint {
    projector
        .locate(s)
        .unwrap_or_else(|| frame.ellipse_point(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(car: CarNumber, secs: i64, x: f64, y: f64) -> LocationSample {
        LocationSample {
            driver_number: car,
            date: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            x,
            y,
            z: 0.0,
        }
    }

    fn square() -> Vec<LocationSample> {
        vec![
            sample(1, 0, -100.0, 0.0),
            sample(2, 0, 100.0, 0.0),
            sample(3, 0, 0.0, 50.0),
            sample(4, 0, 0.0, -50.0),
        ]
    }

    #[test]
    fn test_cardinal_directions() {
        let (_, progress) = map_progress(&square()).unwrap();
        // atan2 of (0, -1) is PI, which wraps to 0
        assert!(progress[&1].value() < 1e-9);
        assert!((progress[&2].value() - 0.5).abs() < 1e-9);
        assert!((progress[&3].value() - 0.75).abs() < 1e-9);
        assert!((progress[&4].value() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_uses_latest_sample_per_car() {
        let mut batch = square();
        batch.push(sample(1, 5, 100.0, 0.0));
        let (_, progress) = map_progress(&batch).unwrap();
        assert!((progress[&1].value() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_axis_is_unavailable() {
        let batch = vec![sample(1, 0, 0.0, 5.0), sample(2, 0, 10.0, 5.0)];
        assert!(map_progress(&batch).is_none());
        assert!(map_progress(&[]).is_none());
    }

    #[test]
    fn test_non_finite_points_are_ignored() {
        let mut batch = square();
        batch.push(sample(9, 0, f64::NAN, 1.0));
        let (frame, progress) = map_progress(&batch).unwrap();
        assert_eq!(frame.half_w, 100.0);
        assert!(!progress.contains_key(&9));
    }

    #[test]
    fn test_ellipse_point_round_trips_progress() {
        let (frame, _) = map_progress(&square()).unwrap();
        for v in [0.1, 0.3, 0.62, 0.9] {
            let p = frame.ellipse_point(Progress::new(v));
            assert!((frame.progress_of(p).value() - v).abs() < 1e-9);
        }
    }

    fn circle(n: usize) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| {
                let a = i as f64 / n as f64 * 2.0 * PI;
                TrackPoint::new(a.cos() * 100.0, a.sin() * 50.0)
            })
            .collect()
    }

    #[test]
    fn test_projector_follows_outline() {
        let (frame, _) = map_progress(&square()).unwrap();
        let outline = circle(64);
        let projector = TrackProjector::new(&frame, &outline);
        assert!(!projector.is_empty());

        let p = projector.locate(Progress::new(0.5)).unwrap();
        assert!((p.x - 100.0).abs() < 1.0);
        assert!(p.y.abs() < 1.0);
    }

    #[test]
    fn test_projector_wraps_across_line() {
        let (frame, _) = map_progress(&square()).unwrap();
        let projector = TrackProjector::new(&frame, &circle(64));
        let p = projector.locate(Progress::new(0.9999)).unwrap();
        assert!(p.x < -99.0);
    }

    #[test]
    fn test_short_outline_falls_back_to_ellipse() {
        let (frame, _) = map_progress(&square()).unwrap();
        let projector = TrackProjector::new(&frame, &circle(5));
        assert!(projector.is_empty());
        let p = project(&frame, &projector, Progress::new(0.5));
        assert!((p.x - 100.0).abs() < 1e-9);
    }
}
