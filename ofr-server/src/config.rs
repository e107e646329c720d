//! Server configuration
//!
//! An optional JSON file supplies any subset of the settings; command line
//! flags win over the file. Every section falls back to its defaults.

use anyhow::{Context, Result};
use clap::Parser;
use ofr_core::EngineConfig;
use ofr_providers::{geometry, jolpica, openf1};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_PORT: u16 = 9200;

#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: <config dir>/ofr/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serve synthetic telemetry instead of OpenF1
    #[arg(long)]
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub demo: bool,
    pub engine: EngineConfig,
    pub runtime: RuntimeConfig,
    pub providers: ProviderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            demo: false,
            engine: EngineConfig::default(),
            runtime: RuntimeConfig::default(),
            providers: ProviderConfig::default(),
        }
    }
}

/// Loop rates of the replay runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub clock_tick_ms: u64,
    pub fetch_interval_ms: u64,
    pub render_fps: f64,
    /// Scenes buffered per SSE subscriber before it starts lagging
    pub scene_channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clock_tick_ms: 16,
            fetch_interval_ms: 250,
            render_fps: 30.0,
            scene_channel_capacity: 16,
        }
    }
}

impl RuntimeConfig {
    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms.max(1))
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms.max(1))
    }

    pub fn render_interval(&self) -> Duration {
        let fps = if self.render_fps.is_finite() && self.render_fps > 0.0 {
            self.render_fps.min(240.0)
        } else {
            30.0
        };
        Duration::from_secs_f64(1.0 / fps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub openf1_url: String,
    pub jolpica_url: String,
    pub geometry_url: String,
    pub cache: CacheKind,
    /// Overrides the platform cache directory for the disk cache
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl_minutes: i64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openf1_url: openf1::DEFAULT_BASE_URL.to_string(),
            jolpica_url: jolpica::DEFAULT_BASE_URL.to_string(),
            geometry_url: geometry::DEFAULT_GEOJSON_URL.to_string(),
            cache: CacheKind::Memory,
            cache_dir: None,
            cache_ttl_minutes: ofr_providers::cache::DEFAULT_TTL_MINUTES,
        }
    }
}

impl ServerConfig {
    /// `<config dir>/ofr/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ofr").join(CONFIG_FILE_NAME))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Could not parse config file {}", path.display()))
    }

    /// Resolve the effective config. An explicit `--config` must exist; the
    /// default location is optional.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_cli(cli);
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if cli.demo {
            self.demo = true;
        }
    }
}
