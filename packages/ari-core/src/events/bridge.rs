//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain services
//! and transport concerns, mapping typed domain events to the WebSocket
//! broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, EngineStatusEvent, PlayerEvent};

/// Bridges domain events to the WebSocket broadcast channel.
///
/// Also forwards to an optional secondary emitter (e.g. [`super::LoggingEventEmitter`])
/// that can be attached after construction.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets a secondary emitter that receives a copy of every event.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    ///
    /// WebSocket handlers use this to subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_player, PlayerEvent, Player);
    impl_emit!(emit_engine, EngineStatusEvent, Engine);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GuildId;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bridge = BroadcastEventBridge::new(16);
        let mut rx = bridge.subscribe();

        bridge.emit_player(PlayerEvent::Stop {
            guild_id: GuildId(1),
        });
        bridge.emit_player(PlayerEvent::QueueShuffle {
            guild_id: GuildId(1),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, BroadcastEvent::Player(PlayerEvent::Stop { .. })));
        assert!(matches!(
            second,
            BroadcastEvent::Player(PlayerEvent::QueueShuffle { .. })
        ));
    }

    #[test]
    fn emitting_without_receivers_does_not_fail() {
        let bridge = BroadcastEventBridge::new(4);
        bridge.emit_player(PlayerEvent::Disconnect {
            guild_id: GuildId(2),
        });
    }
}
