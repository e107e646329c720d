//! Rendered replay scene
//!
//! A `Scene` is everything a client needs to draw one frame: the viewport,
//! the track layers, car dots, playback controls state and the side panels.
//! It is produced by [`crate::engine::ReplayEngine::render`], serialized as
//! JSON for the stream and optionally turned into a standalone SVG.

use crate::camera::Viewport;
use crate::clock::PlaybackState;
use crate::model::{CarNumber, TrackPoint};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// Round f64 to 1 decimal place; telemetry units are far coarser
fn round1<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10.0).round() / 10.0)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Scene {
    pub session: Option<SceneSession>,
    pub viewport: Viewport,
    pub track: TrackLayer,
    pub cars: Vec<CarDot>,
    pub playback: PlaybackInfo,
    pub banner: Option<Banner>,
    pub order: Vec<OrderRow>,
    pub focus: Option<FocusPanel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneSession {
    pub session_key: u32,
    pub label: String,
}

/// Track shape layers. The cloud is only filled while there is no outline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackLayer {
    pub overlay: Vec<TrackPoint>,
    pub outline: Vec<TrackPoint>,
    pub cloud: Vec<TrackPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarDot {
    pub driver_number: CarNumber,
    pub acronym: String,
    pub full_name: String,
    pub team: String,
    pub colour: String,
    #[serde(serialize_with = "round1")]
    pub x: f64,
    #[serde(serialize_with = "round1")]
    pub y: f64,
    pub focused: bool,
    pub dimmed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackInfo {
    pub t: f64,
    pub state: PlaybackState,
    pub speed: f64,
    pub time: Option<DateTime<Utc>>,
    pub time_label: Option<String>,
}

impl Default for PlaybackInfo {
    fn default() -> Self {
        Self {
            t: 0.0,
            state: PlaybackState::Paused,
            speed: 1.0,
            time: None,
            time_label: None,
        }
    }
}

/// Status line above the map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Banner {
    RateLimited { retry_in_secs: u64 },
    Error { message: String },
}

impl Banner {
    pub fn text(&self) -> String {
        match self {
            Banner::RateLimited { retry_in_secs } => {
                format!("Rate limited. Try again in {}s.", retry_in_secs)
            }
            Banner::Error { message } => message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRow {
    pub position: u32,
    pub driver_number: CarNumber,
    pub acronym: String,
    pub full_name: String,
    pub team: String,
    pub colour: String,
    pub lap: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusPanel {
    pub driver_number: CarNumber,
    pub acronym: String,
    pub full_name: String,
    pub team: String,
    pub colour: String,
    pub position: Option<u32>,
    pub lap: Option<u32>,
    pub last_update: Option<DateTime<Utc>>,
    pub locked: bool,
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn polyline(out: &mut String, points: &[TrackPoint], width: u32, opacity: f64) {
    let pts: Vec<String> = points
        .iter()
        .map(|p| format!("{:.1},{:.1}", p.x, p.y))
        .collect();
    let _ = write!(
        out,
        r#"<polyline points="{}" fill="none" stroke="currentColor" stroke-width="{}" opacity="{}" stroke-linejoin="round" stroke-linecap="round"/>"#,
        pts.join(" "),
        width,
        opacity
    );
}

impl Scene {
    pub fn has_focus(&self) -> bool {
        self.cars.iter().any(|c| c.focused)
    }

    /// Standalone SVG of the map
    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{}" width="100%" height="360">"#,
            self.viewport.view_box()
        );

        let has_overlay = self.track.overlay.len() >= 10;
        if has_overlay {
            polyline(&mut out, &self.track.overlay, 38, 0.22);
        }
        if self.track.outline.len() >= 10 {
            let opacity = if has_overlay { 0.06 } else { 0.14 };
            polyline(&mut out, &self.track.outline, 40, opacity);
        } else {
            for p in &self.track.cloud {
                let _ = write!(
                    out,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="8" opacity="0.03" fill="currentColor"/>"#,
                    p.x, p.y
                );
            }
        }

        for car in &self.cars {
            let (r, font) = if car.focused { (52, 40) } else { (40, 36) };
            let opacity = if car.dimmed { 0.2 } else { 1.0 };
            let _ = write!(
                out,
                r##"<g opacity="{}" data-car="{}"><circle cx="{:.1}" cy="{:.1}" r="{}" fill="{}"/><text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="{}" fill="#fff">{}</text>"##,
                opacity,
                car.driver_number,
                car.x,
                car.y,
                r,
                escape(&car.colour),
                car.x,
                car.y + 10.0,
                font,
                escape(&car.acronym)
            );
            if car.focused {
                let _ = write!(
                    out,
                    r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="18" fill="currentColor" opacity="0.9">{}</text>"#,
                    car.x,
                    car.y - 60.0,
                    escape(&car.full_name)
                );
            }
            out.push_str("</g>");
        }

        out.push_str("</svg>");
        out
    }
}
