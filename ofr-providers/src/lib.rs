//! Data providers for OpenF1 Replay
//!
//! Thin HTTP clients for the public data sources, a local TTL cache, and a
//! synthetic telemetry source for running without network access.

pub mod cache;
pub mod demo;
pub mod geometry;
mod http;
pub mod jolpica;
pub mod openf1;

pub use cache::{DiskBackend, MemoryBackend, TtlCache};
pub use demo::DemoSource;
pub use geometry::GeometryClient;
pub use jolpica::SeasonClient;
pub use openf1::OpenF1Client;
