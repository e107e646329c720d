//! Track outline accumulation
//!
//! Without circuit geometry the track shape is traced from telemetry: the
//! first batch picks one car, and from then on only that car's samples are
//! collected. Once enough points have been seen (roughly one lap) they are
//! sorted, thinned and cached as the outline.

use crate::model::{CarNumber, LocationSample, TrackPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineConfig {
    /// Samples needed before any outline is produced
    pub min_points: usize,

    /// Thinning divisor: stride is `max(1, count / target_density)`
    pub target_density: usize,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            min_points: 200,
            target_density: 1200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackOutlineAccumulator {
    config: OutlineConfig,
    locked_car: Option<CarNumber>,
    points: Vec<(DateTime<Utc>, TrackPoint)>,
    last_date: Option<DateTime<Utc>>,
    outline: Vec<TrackPoint>,
}

impl TrackOutlineAccumulator {
    pub fn new(config: OutlineConfig) -> Self {
        Self {
            config,
            locked_car: None,
            points: Vec::new(),
            last_date: None,
            outline: Vec::new(),
        }
    }

    /// Feed one batch and return the current outline (empty until the
    /// threshold is reached)
    pub fn accumulate(&mut self, samples: &[LocationSample]) -> &[TrackPoint] {
        if self.locked_car.is_none() {
            self.locked_car = pick_car(samples);
            if let Some(car) = self.locked_car {
                debug!("Tracing outline from car {}", car);
            }
        }
        let Some(car) = self.locked_car else {
            return &self.outline;
        };

        for s in samples.iter().filter(|s| s.driver_number == car && s.is_finite()) {
            if self.last_date.is_some_and(|last| s.date <= last) {
                continue;
            }
            self.points.push((s.date, s.point()));
            self.last_date = Some(s.date);
        }

        if self.points.len() >= self.config.min_points {
            self.rebuild();
        }
        &self.outline
    }

    fn rebuild(&mut self) {
        self.points.sort_by_key(|(date, _)| *date);
        let stride = (self.points.len() / self.config.target_density.max(1)).max(1);
        self.outline = self
            .points
            .iter()
            .step_by(stride)
            .map(|(_, p)| *p)
            .collect();
    }

    pub fn outline(&self) -> &[TrackPoint] {
        &self.outline
    }

    pub fn locked_car(&self) -> Option<CarNumber> {
        self.locked_car
    }

    pub fn accumulated_len(&self) -> usize {
        self.points.len()
    }

    pub fn reset(&mut self) {
        self.locked_car = None;
        self.points.clear();
        self.last_date = None;
        self.outline.clear();
    }
}

impl Default for TrackOutlineAccumulator {
    fn default() -> Self {
        Self::new(OutlineConfig::default())
    }
}

/// Car with the most samples; ties go to the car seen first
fn pick_car(samples: &[LocationSample]) -> Option<CarNumber> {
    let mut counts: HashMap<CarNumber, usize> = HashMap::new();
    let mut order: Vec<CarNumber> = Vec::new();
    for s in samples {
        let count = counts.entry(s.driver_number).or_insert(0);
        if *count == 0 {
            order.push(s.driver_number);
        }
        *count += 1;
    }

    let mut best: Option<(CarNumber, usize)> = None;
    for car in order {
        let n = counts[&car];
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((car, n));
        }
    }
    best.map(|(car, _)| car)
}
