//! OpenF1 Replay Server Library
//!
//! Exposes server components for integration testing.

pub mod api;
pub mod config;
pub mod runtime;
pub mod state;
pub mod web_ui;
