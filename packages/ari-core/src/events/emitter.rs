//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{EngineStatusEvent, PlayerEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Sessions call this while still holding their guild lock, so per-guild
/// order on the emitter matches commit order. Implementations must not block.
pub trait EventEmitter: Send + Sync {
    /// Emits a guild-scoped playback event.
    fn emit_player(&self, event: PlayerEvent);

    /// Emits an engine health event.
    fn emit_engine(&self, event: EngineStatusEvent);
}

/// No-op emitter for testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_player(&self, _event: PlayerEvent) {}

    fn emit_engine(&self, _event: EngineStatusEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_player(&self, event: PlayerEvent) {
        tracing::debug!(?event, "player_event");
    }

    fn emit_engine(&self, event: EngineStatusEvent) {
        tracing::debug!(?event, "engine_event");
    }
}
