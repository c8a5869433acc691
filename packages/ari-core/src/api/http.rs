//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::response::{api_ok, api_readiness, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::engine::EngineEvent;
use crate::error::{AriError, AriResult};
use crate::protocol_constants::{DEFAULT_ENTRIES_PER_PAGE, MAX_ENGINE_EVENT_BODY_SIZE, SERVICE_ID};
use crate::types::GuildId;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_entries_per_page")]
    entries_per_page: usize,
}

fn default_entries_per_page() -> usize {
    DEFAULT_ENTRIES_PER_PAGE
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/guilds/{guild}/queue", get(get_queue))
        .route("/api/guilds/{guild}/history", get(get_history))
        .route("/api/guilds/{guild}/state", get(get_state))
        .route(
            "/engine/events",
            post(receive_engine_event).layer(DefaultBodyLimit::max(MAX_ENGINE_EVENT_BODY_SIZE)),
        )
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness check: "Is the process running?"
///
/// Always returns 200 OK if the server is responding. Use `/ready` for
/// readiness checks that verify the audio engine answers.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.registry.len(),
        "connections": state.ws_manager.connection_count(),
    }))
}

/// Readiness check: 200 only when the audio engine answers a live ping.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.health.assert_ready().await;
    let body = match &result {
        Ok(()) => json!({ "status": "ready", "ready": true }),
        Err(e) => json!({ "status": "not_ready", "ready": false, "reason": e.to_string() }),
    };
    api_readiness(result.is_ok(), body)
}

async fn get_queue(
    State(state): State<AppState>,
    Path(guild): Path<u64>,
    Query(q): Query<PageQuery>,
) -> AriResult<impl IntoResponse> {
    let page = state
        .registry
        .queue(GuildId(guild), q.page, q.entries_per_page)
        .await?;
    Ok(api_success(page))
}

async fn get_history(
    State(state): State<AppState>,
    Path(guild): Path<u64>,
    Query(q): Query<PageQuery>,
) -> AriResult<impl IntoResponse> {
    let page = state
        .registry
        .history(GuildId(guild), q.page, q.entries_per_page)
        .await?;
    Ok(api_success(page))
}

async fn get_state(
    State(state): State<AppState>,
    Path(guild): Path<u64>,
) -> AriResult<impl IntoResponse> {
    Ok(api_success(state.registry.state(GuildId(guild)).await?))
}

/// Checks the `Authorization` header when the engine is configured with a password.
fn authorize_engine(state: &AppState, headers: &HeaderMap) -> AriResult<()> {
    let Some(expected) = state.config.engine.password.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        log::warn!("[Engine] Rejected event with missing or wrong authorization");
        Err(AriError::Unauthorized("engine event authorization".into()))
    }
}

/// Inbound notifications from the audio engine node.
async fn receive_engine_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AriResult<impl IntoResponse> {
    authorize_engine(&state, &headers)?;

    let event: EngineEvent = serde_json::from_slice(&body).map_err(|e| {
        log::warn!("[Engine] Unparseable event: {}", e);
        AriError::InvalidRequest(format!("malformed engine event: {}", e))
    })?;

    log::trace!("[Engine] Event {:?}", event);
    state.registry.handle_engine_event(event).await;
    Ok(api_ok())
}
