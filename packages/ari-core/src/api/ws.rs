//! WebSocket RPC and event bus.
//!
//! Clients send `CALL` messages naming a procedure and receive a `RESULT` or
//! `ERROR` carrying the same id. Committed transitions are pushed as `EVENT`
//! messages, optionally filtered to the guilds the client subscribed to.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use crate::api::AppState;
use crate::entry::{Aid, Eid, Whence};
use crate::error::{AriError, AriResult, ErrorKind};
use crate::events::BroadcastEvent;
use crate::protocol_constants::{DEFAULT_ENTRIES_PER_PAGE, WS_HEARTBEAT_CHECK_INTERVAL_SECS};
use crate::types::{ChannelId, GuildId};

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    Call {
        id: u64,
        procedure: String,
        #[serde(default)]
        args: Value,
    },
    Subscribe {
        #[serde(rename = "guildIds")]
        guild_ids: Vec<GuildId>,
    },
    Unsubscribe {
        #[serde(rename = "guildIds", default)]
        guild_ids: Option<Vec<GuildId>>,
    },
    Heartbeat,
}

/// Outgoing WebSocket messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    Result {
        id: u64,
        result: Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        error: &'static str,
        kind: ErrorKind,
        message: String,
    },
    Event {
        payload: BroadcastEvent,
    },
    HeartbeatAck,
}

impl WsOutgoing {
    fn error(id: Option<u64>, err: &AriError) -> Self {
        WsOutgoing::Error {
            id,
            error: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

fn default_entries_per_page() -> usize {
    DEFAULT_ENTRIES_PER_PAGE
}

/// A procedure call with its decoded arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "procedure",
    content = "args",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Procedure {
    Connect {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
    Disconnect {
        guild_id: GuildId,
    },
    Queue {
        guild_id: GuildId,
        #[serde(default)]
        page: usize,
        #[serde(default = "default_entries_per_page")]
        entries_per_page: usize,
    },
    History {
        guild_id: GuildId,
        #[serde(default)]
        page: usize,
        #[serde(default = "default_entries_per_page")]
        entries_per_page: usize,
    },
    State {
        guild_id: GuildId,
    },
    Enqueue {
        guild_id: GuildId,
        eid: Eid,
    },
    Dequeue {
        guild_id: GuildId,
        aid: Aid,
    },
    Move {
        guild_id: GuildId,
        aid: Aid,
        index: i64,
        #[serde(default)]
        whence: Whence,
    },
    ClearQueue {
        guild_id: GuildId,
    },
    ShuffleQueue {
        guild_id: GuildId,
    },
    Pause {
        guild_id: GuildId,
        paused: bool,
    },
    SetVolume {
        guild_id: GuildId,
        volume: f32,
    },
    Seek {
        guild_id: GuildId,
        position: f64,
    },
    SkipNext {
        guild_id: GuildId,
    },
    SkipPrevious {
        guild_id: GuildId,
    },
    Stop {
        guild_id: GuildId,
    },
    AssertReady {},
}

impl Procedure {
    /// Decodes a procedure name and its argument object.
    pub fn parse(name: &str, args: Value) -> AriResult<Self> {
        let args = match args {
            Value::Null => json!({}),
            other => other,
        };
        serde_json::from_value(json!({ "procedure": name, "args": args }))
            .map_err(|e| AriError::InvalidRequest(format!("{}: {}", name, e)))
    }
}

fn to_value<T: Serialize>(value: T) -> AriResult<Value> {
    serde_json::to_value(value).map_err(|e| AriError::Internal(e.to_string()))
}

/// Runs a procedure against the application services.
pub(crate) async fn dispatch(state: &AppState, procedure: Procedure) -> AriResult<Value> {
    let registry = &state.registry;
    match procedure {
        Procedure::Connect {
            guild_id,
            channel_id,
        } => registry.connect(guild_id, channel_id).await.map(|()| Value::Null),
        Procedure::Disconnect { guild_id } => {
            registry.disconnect(guild_id).await.map(|()| Value::Null)
        }
        Procedure::Queue {
            guild_id,
            page,
            entries_per_page,
        } => to_value(registry.queue(guild_id, page, entries_per_page).await?),
        Procedure::History {
            guild_id,
            page,
            entries_per_page,
        } => to_value(registry.history(guild_id, page, entries_per_page).await?),
        Procedure::State { guild_id } => to_value(registry.state(guild_id).await?),
        Procedure::Enqueue { guild_id, eid } => to_value(registry.enqueue(guild_id, eid).await?),
        Procedure::Dequeue { guild_id, aid } => to_value(registry.dequeue(guild_id, aid).await?),
        Procedure::Move {
            guild_id,
            aid,
            index,
            whence,
        } => to_value(registry.move_entry(guild_id, aid, index, whence).await?),
        Procedure::ClearQueue { guild_id } => to_value(registry.clear_queue(guild_id).await?),
        Procedure::ShuffleQueue { guild_id } => {
            registry.shuffle_queue(guild_id).await.map(|()| Value::Null)
        }
        Procedure::Pause { guild_id, paused } => {
            registry.pause(guild_id, paused).await.map(|()| Value::Null)
        }
        Procedure::SetVolume { guild_id, volume } => {
            registry.set_volume(guild_id, volume).await.map(|()| Value::Null)
        }
        Procedure::Seek { guild_id, position } => {
            registry.seek(guild_id, position).await.map(|()| Value::Null)
        }
        Procedure::SkipNext { guild_id } => registry.skip_next(guild_id).await.map(|()| Value::Null),
        Procedure::SkipPrevious { guild_id } => {
            registry.skip_previous(guild_id).await.map(|()| Value::Null)
        }
        Procedure::Stop { guild_id } => registry.stop(guild_id).await.map(|()| Value::Null),
        Procedure::AssertReady {} => state.health.assert_ready().await.map(|()| Value::Null),
    }
}

/// Decodes and runs one CALL, producing its reply.
async fn handle_call(state: &AppState, id: u64, name: &str, args: Value) -> WsOutgoing {
    let result = match Procedure::parse(name, args) {
        Ok(procedure) => {
            log::debug!("[WS] CALL {} {:?}", id, procedure);
            dispatch(state, procedure).await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(result) => WsOutgoing::Result { id, result },
        Err(e) => {
            if e.kind() == ErrorKind::Internal {
                log::error!("[WS] CALL {} ({}) failed: {}", id, name, e);
            } else {
                log::debug!("[WS] CALL {} ({}) rejected: {}", id, name, e);
            }
            WsOutgoing::error(Some(id), &e)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Loop
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.event_bridge.subscribe();
    let mut last_activity = Instant::now();
    let heartbeat_timeout = Duration::from_secs(state.config.ws_heartbeat_timeout_secs);

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsIncoming>(&text) {
                            Ok(WsIncoming::Call { id, procedure, args }) => {
                                Some(handle_call(&state, id, &procedure, args).await)
                            }
                            Ok(WsIncoming::Subscribe { guild_ids }) => {
                                conn_guard.subscribe(&guild_ids);
                                None
                            }
                            Ok(WsIncoming::Unsubscribe { guild_ids }) => {
                                conn_guard.unsubscribe(guild_ids.as_deref());
                                None
                            }
                            Ok(WsIncoming::Heartbeat) => Some(WsOutgoing::HeartbeatAck),
                            Err(e) => {
                                let err = AriError::InvalidRequest(format!("malformed message: {}", e));
                                Some(WsOutgoing::error(None, &err))
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => None,
                };
                if let Some(msg) = reply.and_then(|r| r.to_message()) {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !conn_guard.wants(&event) {
                            continue;
                        }
                        if let Some(msg) = (WsOutgoing::Event { payload: event }).to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[WS] {} lagged, dropped {} events", conn_guard.id(), skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > heartbeat_timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_guard.id());
                    break;
                }
            }
        }
    }
}
