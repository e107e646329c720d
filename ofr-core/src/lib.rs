//! OpenF1 Replay Core Library
//!
//! This crate provides the telemetry data model, the season data model and
//! the replay engine that turns sparse, polled telemetry slices into smooth,
//! track-locked car positions.

pub mod camera;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod outline;
pub mod predictor;
pub mod progress;
pub mod scene;
pub mod season;
pub mod source;
pub mod units;

pub use config::EngineConfig;
pub use engine::ReplayEngine;
pub use error::FetchError;
pub use model::{CarNumber, Driver, LocationSample, Session, TrackPoint};
pub use source::TelemetrySource;
