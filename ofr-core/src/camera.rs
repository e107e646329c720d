//! Camera framing and driver selection
//!
//! The view window is derived from whatever shape data is best right now
//! (circuit geometry, traced outline, raw sample cloud, or the car dots) and
//! only ever grows, so the map does not breathe as sparse slices come and go.

use crate::model::{CarNumber, TrackPoint};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounds in telemetry space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Padded bounding box, or `None` for empty or zero-extent input
    pub fn from_points<'a, I>(points: I, pad: f64) -> Option<Self>
    where
        I: IntoIterator<Item = &'a TrackPoint>,
    {
        let mut b = Bounds {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        let mut any = false;
        for p in points {
            if !p.x.is_finite() || !p.y.is_finite() {
                continue;
            }
            any = true;
            b.min_x = b.min_x.min(p.x);
            b.max_x = b.max_x.max(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_y = b.max_y.max(p.y);
        }
        if !any {
            return None;
        }

        b.min_x -= pad;
        b.max_x += pad;
        b.min_y -= pad;
        b.max_y += pad;
        if b.width() < 1e-6 || b.height() < 1e-6 {
            return None;
        }
        Some(b)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> TrackPoint {
        TrackPoint::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow each axis to at least the given size around its center
    pub fn ensure_min_size(&self, min_w: f64, min_h: f64) -> Bounds {
        let mut b = *self;
        if b.width() < min_w {
            let cx = (b.min_x + b.max_x) / 2.0;
            b.min_x = cx - min_w / 2.0;
            b.max_x = cx + min_w / 2.0;
        }
        if b.height() < min_h {
            let cy = (b.min_y + b.max_y) / 2.0;
            b.min_y = cy - min_h / 2.0;
            b.max_y = cy + min_h / 2.0;
        }
        b
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub overlay_pad: f64,
    pub outline_pad: f64,
    pub cloud_pad: f64,
    pub dots_pad: f64,
    pub overlay_min_points: usize,
    pub outline_min_points: usize,
    pub cloud_min_points: usize,
    pub dots_min_points: usize,
    /// Floor for either axis of the stable bounds
    pub min_extent: f64,
    /// Candidates are floored to this multiple of their own extent
    pub growth: f64,
    /// Fraction of the stable extent shown while locked on a car
    pub focus_zoom: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            overlay_pad: 260.0,
            outline_pad: 220.0,
            cloud_pad: 280.0,
            dots_pad: 320.0,
            overlay_min_points: 10,
            outline_min_points: 10,
            cloud_min_points: 8,
            dots_min_points: 2,
            min_extent: 6000.0,
            growth: 1.2,
            focus_zoom: 0.55,
        }
    }
}

/// Shape data available this frame, best first
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraSources<'a> {
    pub overlay: &'a [TrackPoint],
    pub outline: &'a [TrackPoint],
    pub cloud: &'a [TrackPoint],
    pub dots: &'a [TrackPoint],
}

/// Visible window (SVG viewBox order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: -10000.0,
            y: -10000.0,
            w: 20000.0,
            h: 20000.0,
        }
    }
}

impl Viewport {
    pub fn view_box(&self) -> String {
        format!("{} {} {} {}", self.x, self.y, self.w, self.h)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CameraController {
    config: CameraConfig,
    stable: Option<Bounds>,
}

impl CameraController {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            stable: None,
        }
    }

    /// Bounds of the highest-priority source with enough points
    pub fn candidate(&self, sources: &CameraSources<'_>) -> Option<Bounds> {
        let c = &self.config;
        if sources.overlay.len() >= c.overlay_min_points {
            return Bounds::from_points(sources.overlay, c.overlay_pad);
        }
        if sources.outline.len() >= c.outline_min_points {
            return Bounds::from_points(sources.outline, c.outline_pad);
        }
        if sources.cloud.len() >= c.cloud_min_points {
            return Bounds::from_points(sources.cloud, c.cloud_pad);
        }
        if sources.dots.len() >= c.dots_min_points {
            return Bounds::from_points(sources.dots, c.dots_pad);
        }
        None
    }

    /// Fold this frame's candidate into the stable bounds
    pub fn update(&mut self, sources: &CameraSources<'_>) -> Option<Bounds> {
        if let Some(candidate) = self.candidate(sources) {
            let min_w = self.config.min_extent.max(candidate.width() * self.config.growth);
            let min_h = self.config.min_extent.max(candidate.height() * self.config.growth);
            let safe = candidate.ensure_min_size(min_w, min_h);
            self.stable = Some(match self.stable {
                Some(prev) => prev.union(&safe),
                None => safe,
            });
        }
        self.stable
    }

    pub fn stable(&self) -> Option<Bounds> {
        self.stable
    }

    /// Viewport for this frame. `focus` is the locked car's position, if any.
    pub fn viewport(&self, focus: Option<TrackPoint>) -> Viewport {
        let Some(b) = self.stable else {
            return Viewport::default();
        };
        match focus {
            Some(p) => {
                let w = b.width() * self.config.focus_zoom;
                let h = b.height() * self.config.focus_zoom;
                Viewport {
                    x: p.x - w / 2.0,
                    y: p.y - h / 2.0,
                    w,
                    h,
                }
            }
            None => Viewport {
                x: b.min_x,
                y: b.min_y,
                w: b.width(),
                h: b.height(),
            },
        }
    }

    pub fn reset(&mut self) {
        self.stable = None;
    }
}

/// Driver focus state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "car", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Unfocused,
    Focused(CarNumber),
    FocusedLocked(CarNumber),
}

impl Selection {
    /// Selecting a car always starts unlocked
    pub fn select(&mut self, car: CarNumber) {
        *self = Selection::Focused(car);
    }

    pub fn clear(&mut self) {
        *self = Selection::Unfocused;
    }

    pub fn toggle_lock(&mut self) {
        *self = match *self {
            Selection::Focused(c) => Selection::FocusedLocked(c),
            Selection::FocusedLocked(c) => Selection::Focused(c),
            Selection::Unfocused => Selection::Unfocused,
        };
    }

    pub fn focused_car(&self) -> Option<CarNumber> {
        match *self {
            Selection::Focused(c) | Selection::FocusedLocked(c) => Some(c),
            Selection::Unfocused => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Selection::FocusedLocked(_))
    }
}

/// Fit a lon/lat polyline into `bounds`, preserving aspect ratio and putting
/// north at the top of the screen
pub fn fit_overlay(coords: &[[f64; 2]], bounds: &Bounds) -> Vec<TrackPoint> {
    let finite: Vec<[f64; 2]> = coords
        .iter()
        .copied()
        .filter(|c| c[0].is_finite() && c[1].is_finite())
        .collect();
    if finite.len() < 2 {
        return Vec::new();
    }

    let mid_lat = finite.iter().map(|c| c[1]).sum::<f64>() / finite.len() as f64;
    let lon_scale = mid_lat.to_radians().cos().abs().max(1e-6);
    let projected: Vec<TrackPoint> = finite
        .iter()
        .map(|c| TrackPoint::new(c[0] * lon_scale, c[1]))
        .collect();

    let Some(geo) = Bounds::from_points(&projected, 0.0) else {
        return Vec::new();
    };
    let scale = (bounds.width() / geo.width()).min(bounds.height() / geo.height());
    let from = geo.center();
    let to = bounds.center();

    projected
        .iter()
        .map(|p| TrackPoint::new(to.x + (p.x - from.x) * scale, to.y - (p.y - from.y) * scale))
        .collect()
}
