//! WebSocket connection tracking and management.
//!
//! - `WsConnectionManager`: tracks active connections and their guild subscriptions
//! - `ConnectionGuard`: RAII guard for automatic cleanup on disconnect

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::events::BroadcastEvent;
use crate::types::GuildId;

/// Per-connection state.
#[derive(Default)]
struct ConnectionState {
    /// Guilds whose events this connection receives. `None` means all guilds.
    subscriptions: Option<HashSet<GuildId>>,
}

impl ConnectionState {
    fn wants(&self, event: &BroadcastEvent) -> bool {
        match (&self.subscriptions, event.guild_id()) {
            (Some(guilds), Some(guild_id)) => guilds.contains(&guild_id),
            _ => true,
        }
    }
}

/// Manages all active WebSocket connections.
///
/// Uses hierarchical cancellation tokens so every connection can be
/// force-closed at once on shutdown.
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionState>,
    next_id: AtomicU64,
    /// Parent of every connection token. Replaced after `close_all()`.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection and returns a guard for RAII cleanup.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = format!("ws-{}", id);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections
            .insert(conn_id.clone(), ConnectionState::default());
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            log::info!(
                "[WS] Connection unregistered: {} (remaining: {})",
                id,
                self.connections.len()
            );
        }
    }

    fn subscribe(&self, id: &str, guilds: &[GuildId]) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            conn.subscriptions
                .get_or_insert_with(HashSet::new)
                .extend(guilds.iter().copied());
        }
    }

    fn unsubscribe(&self, id: &str, guilds: Option<&[GuildId]>) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            match guilds {
                Some(guilds) => {
                    if let Some(subscribed) = conn.subscriptions.as_mut() {
                        for guild in guilds {
                            subscribed.remove(guild);
                        }
                    }
                }
                None => conn.subscriptions = None,
            }
        }
    }

    fn wants(&self, id: &str, event: &BroadcastEvent) -> bool {
        self.connections
            .get(id)
            .is_some_and(|conn| conn.wants(event))
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes all connections.
    ///
    /// Cancels the global token, then installs a fresh one so new
    /// connections can still be accepted. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a connection when dropped.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token cancelled on force-close.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Restricts forwarded guild events to `guilds` (cumulative).
    pub fn subscribe(&self, guilds: &[GuildId]) {
        self.manager.subscribe(&self.id, guilds);
    }

    /// Drops the given guilds, or every restriction when `None`.
    pub fn unsubscribe(&self, guilds: Option<&[GuildId]>) {
        self.manager.unsubscribe(&self.id, guilds);
    }

    /// Whether `event` should be forwarded on this connection.
    pub fn wants(&self, event: &BroadcastEvent) -> bool {
        self.manager.wants(&self.id, event)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}
