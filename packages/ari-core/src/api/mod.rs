//! HTTP/WebSocket API layer.
//!
//! Handlers are thin and delegate to the session registry and the engine
//! health monitor. This module owns router assembly and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AriError, AriResult};
use crate::events::BroadcastEventBridge;
use crate::services::{EngineHealthMonitor, SessionRegistry};
use crate::state::Config;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws::Procedure;
pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the TCP listener or serve connections.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Owns every guild session.
    pub registry: Arc<SessionRegistry>,
    /// Tracks audio engine reachability.
    pub health: Arc<EngineHealthMonitor>,
    /// Fan-out of committed events to WebSocket clients.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    registry: Option<Arc<SessionRegistry>>,
    health: Option<Arc<EngineHealthMonitor>>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn health(mut self, health: Arc<EngineHealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    /// Sets the WebSocket connection manager. A fresh one is created if unset.
    pub fn ws_manager(mut self, manager: Arc<WsConnectionManager>) -> Self {
        self.ws_manager = Some(manager);
        self
    }

    /// Sets the configuration. Defaults to the registry's configuration.
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, failing if a required service is missing.
    pub fn build(self) -> AriResult<AppState> {
        let missing = |what: &str| AriError::Configuration(format!("{} is required", what));

        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let config = self
            .config
            .unwrap_or_else(|| Arc::clone(&registry.context().config));

        Ok(AppState {
            health: self.health.ok_or_else(|| missing("health"))?,
            event_bridge: self.event_bridge.ok_or_else(|| missing("event_bridge"))?,
            ws_manager: self.ws_manager.unwrap_or_default(),
            registry,
            config,
        })
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// CORS restricted to the configured trusted origins (prefix match).
fn cors_layer(trusted_origins: Vec<String>) -> CorsLayer {
    log::info!("[Server] CORS trusted origins: {:?}", trusted_origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let origin = origin.to_str().unwrap_or("");
            trusted_origins
                .iter()
                .any(|allowed| origin.starts_with(allowed.as_str()))
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(false)
}

/// Serves the API on `bind_port` until `cancel` fires.
///
/// Open WebSocket connections are force-closed when shutdown begins.
pub async fn start_server(state: AppState, cancel: CancellationToken) -> Result<(), ServerError> {
    let port = state.config.bind_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);

    let ws_manager = Arc::clone(&state.ws_manager);
    let app = http::create_router(state.clone())
        .layer(cors_layer(state.config.trusted_origins.clone()))
        .layer(TraceLayer::new_for_http());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            let closed = ws_manager.close_all();
            log::info!("[Server] Shutting down, closed {} WebSocket(s)", closed);
        })
        .await?;
    Ok(())
}
