//! Audio engine adapter.
//!
//! The session state machine talks to the engine only through the
//! [`AudioEngine`] trait. [`HttpEngineClient`] is the production
//! implementation; tests inject fakes.

mod client;
mod events;
mod retry;

pub use client::HttpEngineClient;
pub use events::{EngineEvent, TrackEndReason};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::Eid;
use crate::types::{ChannelId, GuildId};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while commanding the audio engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP request to the engine failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Engine returned a non-success HTTP status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Engine response could not be decoded.
    #[error("Failed to decode engine response: {0}")]
    Decode(String),
}

/// Convenient Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Returns true if this error is transient and the operation should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Http(e) => e.is_timeout() || e.is_connect(),
            EngineError::HttpStatus(status, _) => matches!(status, 502..=504),
            EngineError::Decode(_) => false,
        }
    }

    /// Returns true if the engine could not accept the command at all.
    ///
    /// Client-side rejections (4xx) and undecodable responses are bugs on
    /// one side or the other, not unavailability.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            EngineError::Http(_) => true,
            EngineError::HttpStatus(status, _) => *status >= 500,
            EngineError::Decode(_) => false,
        }
    }
}

/// What the engine reported after accepting a play command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayedTrack {
    /// Track length, if known. Streams have none.
    pub duration: Option<Duration>,
}

/// Commands the session state machine issues to the audio engine.
///
/// Every command is idempotent at the semantic level, so callers may retry
/// after an [`EngineError`].
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Joins the given voice channel.
    async fn join(&self, guild: GuildId, channel: ChannelId) -> EngineResult<()>;

    /// Leaves voice and destroys the guild's player.
    async fn leave(&self, guild: GuildId) -> EngineResult<()>;

    /// Starts playing `eid` from `start`, replacing whatever is playing.
    async fn play(&self, guild: GuildId, eid: &Eid, start: Duration) -> EngineResult<PlayedTrack>;

    async fn pause(&self, guild: GuildId, paused: bool) -> EngineResult<()>;

    async fn set_volume(&self, guild: GuildId, volume: f32) -> EngineResult<()>;

    async fn seek(&self, guild: GuildId, position: Duration) -> EngineResult<()>;

    /// Stops the current track without leaving voice.
    async fn stop(&self, guild: GuildId) -> EngineResult<()>;

    /// Checks that the engine is reachable.
    async fn ping(&self) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_are_transient() {
        assert!(EngineError::HttpStatus(502, String::new()).is_transient());
        assert!(EngineError::HttpStatus(504, String::new()).is_transient());
        assert!(!EngineError::HttpStatus(500, String::new()).is_transient());
        assert!(!EngineError::HttpStatus(404, String::new()).is_transient());
    }

    #[test]
    fn server_errors_mean_unavailable() {
        assert!(EngineError::HttpStatus(500, String::new()).is_unavailable());
        assert!(!EngineError::HttpStatus(409, String::new()).is_unavailable());
        assert!(!EngineError::Decode("eof".into()).is_unavailable());
    }
}
