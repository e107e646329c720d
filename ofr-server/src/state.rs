//! Application state management

use crate::config::{CacheKind, RuntimeConfig, ServerConfig};
use chrono::Duration as ChronoDuration;
use ofr_core::scene::Scene;
use ofr_core::{ReplayEngine, TelemetrySource};
use ofr_providers::{
    DemoSource, DiskBackend, GeometryClient, MemoryBackend, OpenF1Client, SeasonClient, TtlCache,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The single replay engine every loop and handler works on
    pub engine: Arc<RwLock<ReplayEngine>>,

    /// Telemetry provider (OpenF1 or the demo source)
    pub telemetry: Arc<dyn TelemetrySource>,

    pub seasons: Arc<SeasonClient>,
    pub geometry: Arc<GeometryClient>,

    /// Broadcast channel for rendered scenes
    /// Multiple consumers can subscribe to receive scenes
    pub scene_tx: broadcast::Sender<Scene>,

    /// Wakes the fetch loop early, e.g. after a scrub
    pub fetch_wake: Arc<Notify>,

    /// Cancellation token for the running replay loops
    pub runtime_cancel: Arc<RwLock<Option<CancellationToken>>>,

    pub runtime: RuntimeConfig,
}

impl AppState {
    pub fn new(
        engine: ReplayEngine,
        telemetry: Arc<dyn TelemetrySource>,
        seasons: SeasonClient,
        geometry: GeometryClient,
        runtime: RuntimeConfig,
    ) -> Self {
        let (scene_tx, _) = broadcast::channel(runtime.scene_channel_capacity.max(1));

        Self {
            engine: Arc::new(RwLock::new(engine)),
            telemetry,
            seasons: Arc::new(seasons),
            geometry: Arc::new(geometry),
            scene_tx,
            fetch_wake: Arc::new(Notify::new()),
            runtime_cancel: Arc::new(RwLock::new(None)),
            runtime,
        }
    }

    /// Build the providers the config asks for
    pub fn from_config(config: &ServerConfig) -> Self {
        let providers = &config.providers;
        let telemetry: Arc<dyn TelemetrySource> = if config.demo {
            info!("Using synthetic demo telemetry");
            Arc::new(DemoSource::new())
        } else {
            let ttl = ChronoDuration::minutes(providers.cache_ttl_minutes.max(0));
            let cache: TtlCache<Value> = match providers.cache {
                CacheKind::Memory => TtlCache::new(Box::new(MemoryBackend::new()), ttl),
                CacheKind::Disk => {
                    let dir = providers
                        .cache_dir
                        .clone()
                        .or_else(DiskBackend::default_dir)
                        .unwrap_or_else(|| std::env::temp_dir().join("ofr"));
                    info!("Caching telemetry responses in {}", dir.display());
                    TtlCache::new(Box::new(DiskBackend::new(dir)), ttl)
                }
            };
            Arc::new(OpenF1Client::new(&providers.openf1_url).with_cache(Arc::new(cache)))
        };

        Self::new(
            ReplayEngine::new(config.engine.clone()),
            telemetry,
            SeasonClient::new(&providers.jolpica_url),
            GeometryClient::new(&providers.geometry_url),
            config.runtime.clone(),
        )
    }

    /// State around the demo source with default settings
    pub fn demo() -> Self {
        Self::from_config(&ServerConfig {
            demo: true,
            ..Default::default()
        })
    }

    /// Subscribe to rendered scenes
    pub fn subscribe(&self) -> broadcast::Receiver<Scene> {
        self.scene_tx.subscribe()
    }
}
