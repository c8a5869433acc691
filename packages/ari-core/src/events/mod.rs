//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for guild playback and engine health

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::entry::{Aid, QueueEntry};
use crate::types::{ChannelId, GuildId};

/// Events broadcast to clients.
///
/// This enum categorizes all real-time events that can be sent to connected
/// clients. Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Guild-scoped playback transitions.
    Player(PlayerEvent),

    /// Audio engine health changes.
    Engine(EngineStatusEvent),
}

impl BroadcastEvent {
    /// Guild the event belongs to, if it is guild-scoped.
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::Player(event) => Some(event.guild_id()),
            Self::Engine(_) => None,
        }
    }
}

/// Guild-scoped playback events, one per committed transition.
///
/// Positions are reported in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Periodic, purely informational snapshot while playing.
    #[serde(rename = "on_play_update", rename_all = "camelCase")]
    PlayUpdate {
        guild_id: GuildId,
        entry: QueueEntry,
        paused: bool,
        position: f64,
        volume: f32,
    },

    /// A new entry became current.
    #[serde(rename = "on_play", rename_all = "camelCase")]
    Play { guild_id: GuildId, entry: QueueEntry },

    #[serde(rename = "on_pause", rename_all = "camelCase")]
    Pause { guild_id: GuildId, paused: bool },

    #[serde(rename = "on_volume_change", rename_all = "camelCase")]
    VolumeChange {
        guild_id: GuildId,
        old: f32,
        new: f32,
    },

    #[serde(rename = "on_seek", rename_all = "camelCase")]
    Seek { guild_id: GuildId, position: f64 },

    /// Nothing is current any more.
    #[serde(rename = "on_stop", rename_all = "camelCase")]
    Stop { guild_id: GuildId },

    #[serde(rename = "on_queue_add", rename_all = "camelCase")]
    QueueAdd {
        guild_id: GuildId,
        entry: QueueEntry,
        position: usize,
    },

    #[serde(rename = "on_queue_remove", rename_all = "camelCase")]
    QueueRemove {
        guild_id: GuildId,
        entry: QueueEntry,
        position: usize,
    },

    #[serde(rename = "on_queue_move", rename_all = "camelCase")]
    QueueMove {
        guild_id: GuildId,
        aid: Aid,
        from: usize,
        to: usize,
    },

    #[serde(rename = "on_queue_clear", rename_all = "camelCase")]
    QueueClear { guild_id: GuildId, removed: usize },

    #[serde(rename = "on_queue_shuffle", rename_all = "camelCase")]
    QueueShuffle { guild_id: GuildId },

    #[serde(rename = "on_history_add", rename_all = "camelCase")]
    HistoryAdd { guild_id: GuildId, entry: QueueEntry },

    #[serde(rename = "on_history_remove", rename_all = "camelCase")]
    HistoryRemove { guild_id: GuildId, entry: QueueEntry },

    #[serde(rename = "on_connect", rename_all = "camelCase")]
    Connect {
        guild_id: GuildId,
        channel_id: ChannelId,
    },

    #[serde(rename = "on_disconnect", rename_all = "camelCase")]
    Disconnect { guild_id: GuildId },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::PlayUpdate { guild_id, .. }
            | Self::Play { guild_id, .. }
            | Self::Pause { guild_id, .. }
            | Self::VolumeChange { guild_id, .. }
            | Self::Seek { guild_id, .. }
            | Self::Stop { guild_id }
            | Self::QueueAdd { guild_id, .. }
            | Self::QueueRemove { guild_id, .. }
            | Self::QueueMove { guild_id, .. }
            | Self::QueueClear { guild_id, .. }
            | Self::QueueShuffle { guild_id }
            | Self::HistoryAdd { guild_id, .. }
            | Self::HistoryRemove { guild_id, .. }
            | Self::Connect { guild_id, .. }
            | Self::Disconnect { guild_id } => *guild_id,
        }
    }

    /// Wire name of the event, e.g. `on_play`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayUpdate { .. } => "on_play_update",
            Self::Play { .. } => "on_play",
            Self::Pause { .. } => "on_pause",
            Self::VolumeChange { .. } => "on_volume_change",
            Self::Seek { .. } => "on_seek",
            Self::Stop { .. } => "on_stop",
            Self::QueueAdd { .. } => "on_queue_add",
            Self::QueueRemove { .. } => "on_queue_remove",
            Self::QueueMove { .. } => "on_queue_move",
            Self::QueueClear { .. } => "on_queue_clear",
            Self::QueueShuffle { .. } => "on_queue_shuffle",
            Self::HistoryAdd { .. } => "on_history_add",
            Self::HistoryRemove { .. } => "on_history_remove",
            Self::Connect { .. } => "on_connect",
            Self::Disconnect { .. } => "on_disconnect",
        }
    }
}

/// Audio engine health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EngineHealth {
    /// The engine answers pings.
    #[default]
    Ok,
    /// The last ping failed.
    Unavailable,
}

/// Events related to audio engine reachability.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineStatusEvent {
    /// Engine health status changed.
    HealthChanged {
        /// Current health status.
        health: EngineHealth,
        /// Human-readable reason for the status (if unavailable).
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<PlayerEvent> for BroadcastEvent {
    fn from(event: PlayerEvent) -> Self {
        BroadcastEvent::Player(event)
    }
}

impl From<EngineStatusEvent> for BroadcastEvent {
    fn from(event: EngineStatusEvent) -> Self {
        BroadcastEvent::Engine(event)
    }
}
