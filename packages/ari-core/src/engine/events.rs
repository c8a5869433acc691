//! Notifications pushed by the audio engine.
//!
//! These are the inbound half of the adapter. They arrive over
//! `POST /engine/events` and are applied to the owning guild's session
//! under its lock.

use serde::Deserialize;

use crate::types::GuildId;

/// Why the engine stopped playing a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    /// Played to completion.
    Finished,
    /// Could not be loaded or decoded.
    LoadFailed,
    /// Stopped by an explicit stop command.
    Stopped,
    /// Replaced by a new play command.
    Replaced,
    /// Player was destroyed.
    Cleanup,
}

impl TrackEndReason {
    /// Whether the session should advance to the next queue entry.
    ///
    /// `Stopped` and `Replaced` are the echo of commands the session already
    /// committed; `Cleanup` follows teardown.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

/// An asynchronous notification from the audio engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    /// The current track ended.
    TrackEnd {
        guild_id: GuildId,
        reason: TrackEndReason,
    },

    /// Periodic player state. `position` is in seconds.
    PlayerUpdate {
        guild_id: GuildId,
        position: f64,
        #[serde(default)]
        paused: Option<bool>,
        #[serde(default)]
        volume: Option<f32>,
    },

    /// A playback error the engine recovered from or is about to report as a track end.
    Error { guild_id: GuildId, reason: String },

    /// The voice connection was closed from the outside.
    VoiceClosed {
        guild_id: GuildId,
        #[serde(default)]
        code: Option<u16>,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl EngineEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackEnd { guild_id, .. }
            | Self::PlayerUpdate { guild_id, .. }
            | Self::Error { guild_id, .. }
            | Self::VoiceClosed { guild_id, .. } => *guild_id,
        }
    }
}
