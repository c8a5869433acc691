//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Binaries call
//! [`bootstrap_services`], start the background tasks, hand
//! [`BootstrappedServices::app_state`] to the server and finally call
//! [`BootstrappedServices::shutdown`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::engine::{AudioEngine, HttpEngineClient};
use crate::error::{AriError, AriResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{EngineHealthMonitor, SessionContext, SessionRegistry};
use crate::state::Config;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub config: Arc<Config>,
    /// Owns every guild session.
    pub registry: Arc<SessionRegistry>,
    /// Periodic engine reachability checks.
    pub health: Arc<EngineHealthMonitor>,
    /// Event bridge for emitting events to WebSocket and the debug log.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the engine health loop and the idle sweeper.
    pub fn start_background_tasks(&self) {
        self.health.spawn(
            &self.spawner,
            self.config.health_check_interval(),
            self.cancel_token.child_token(),
        );
        self.registry
            .spawn_idle_sweeper(self.cancel_token.child_token());
    }

    /// Builds the API state over these services.
    pub fn app_state(&self) -> AriResult<AppState> {
        AppState::builder()
            .registry(Arc::clone(&self.registry))
            .health(Arc::clone(&self.health))
            .event_bridge(Arc::clone(&self.event_bridge))
            .ws_manager(Arc::clone(&self.ws_manager))
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Background tasks are cancelled first, then every guild is disconnected
    /// and remaining WebSocket clients are closed.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();

        let sessions = self.registry.len();
        self.registry.shutdown().await;
        log::info!("[Bootstrap] Disconnected {} session(s)", sessions);

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!(
                "[Bootstrap] Closed {} WebSocket connection(s)",
                connections_closed
            );
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services against the HTTP audio engine named in `config`.
///
/// # Errors
///
/// Returns a configuration error if `config` is invalid or the engine
/// client cannot be built.
pub fn bootstrap_services(config: Config) -> AriResult<BootstrappedServices> {
    let engine = HttpEngineClient::new(&config.engine).map_err(|e| {
        AriError::Configuration(format!("Failed to create engine client: {}", e))
    })?;
    bootstrap_services_with_engine(config, Arc::new(engine))
}

/// Bootstraps all services around an existing engine implementation.
///
/// Wiring order:
///
/// 1. Event bridge (broadcast channel plus the tracing emitter)
/// 2. Session context (engine, emitter, config, spawner)
/// 3. Session registry and engine health monitor
pub fn bootstrap_services_with_engine(
    config: Config,
    engine: Arc<dyn AudioEngine>,
) -> AriResult<BootstrappedServices> {
    config.validate().map_err(AriError::Configuration)?;
    let config = Arc::new(config);

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let ctx = SessionContext {
        engine: Arc::clone(&engine),
        emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        config: Arc::clone(&config),
        spawner: spawner.clone(),
    };
    let registry = Arc::new(SessionRegistry::new(ctx));

    let health = Arc::new(EngineHealthMonitor::new(
        engine,
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
    ));

    log::info!(
        "[Bootstrap] Services ready (engine: {}, max history: {})",
        config.engine.url,
        config.max_history
    );

    Ok(BootstrappedServices {
        config,
        registry,
        health,
        event_bridge,
        ws_manager: Arc::new(WsConnectionManager::new()),
        spawner,
        cancel_token,
    })
}
