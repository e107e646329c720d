//! Circular progress arithmetic
//!
//! A [`Progress`] is the fraction of a lap a car has covered, in `[0, 1)`.
//! Addition wraps modulo 1 and differences take the shortest way around the
//! circle, so a car crossing the line never appears to drive backwards.
//!
//! Progress serializes with 4 decimal places to keep scene payloads small.

use serde::{Deserialize, Serialize};

/// Round f64 to 4 decimal places for compact JSON serialization
fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Normalized position around a closed loop
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Progress(#[serde(serialize_with = "round4")] f64);

impl Progress {
    pub const ZERO: Progress = Progress(0.0);

    /// Create a progress value, wrapping into `[0, 1)`
    pub fn new(value: f64) -> Self {
        Self(wrap01(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Modulo-1 addition
    pub fn wrapping_add(self, delta: f64) -> Self {
        Self::new(self.0 + delta)
    }

    /// Signed shortest distance from `self` to `other`
    pub fn diff_to(self, other: Progress) -> f64 {
        circular_diff(self.0, other.0)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Wrap any finite value into `[0, 1)`. Non-finite values map to 0.
pub fn wrap01(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    let r = x.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if r >= 1.0 {
        0.0
    } else {
        r
    }
}

/// Shortest signed difference `to - from` on the unit circle.
///
/// The result lies in `[-0.5, 0.5]` and is exactly antisymmetric:
/// `circular_diff(a, b) == -circular_diff(b, a)`.
pub fn circular_diff(from: f64, to: f64) -> f64 {
    let d = wrap01(to) - wrap01(from);
    if d > 0.5 {
        d - 1.0
    } else if d < -0.5 {
        d + 1.0
    } else {
        d
    }
}
