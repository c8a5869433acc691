//! Ari Core - per-guild music playback orchestration.
//!
//! Each guild connected to a voice channel owns a session: a FIFO queue of
//! track references, a bounded history of played entries and a small state
//! machine (Idle, Playing, Paused) driving an external audio engine node.
//! Every committed state change is published as an event.
//!
//! # Architecture
//!
//! - [`entry`]: Entries, the queue and the history
//! - [`services`]: Guild sessions, the session registry and engine health
//! - [`engine`]: Audio engine trait and its HTTP implementation
//! - [`events`]: Player and engine events, emitters and the broadcast bridge
//! - [`api`]: WebSocket RPC/pub-sub and HTTP routes
//! - [`bootstrap`]: Composition root
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`AudioEngine`](engine::AudioEngine): Commands sent to the engine node
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod engine;
pub mod entry;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use entry::{Aid, Eid, Entry, History, Queue, QueueEntry, Whence};
pub use error::{AriError, AriResult, ErrorCode, ErrorKind};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EngineHealth, EngineStatusEvent, EventEmitter,
    LoggingEventEmitter, NoopEventEmitter, PlayerEvent,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, EngineConfig};
pub use types::{ChannelId, GuildId};
pub use utils::now_millis;

// Re-export engine types
pub use engine::{AudioEngine, EngineError, EngineEvent, HttpEngineClient, TrackEndReason};

// Re-export service types
pub use services::{EngineHealthMonitor, GuildSession, SessionRegistry, SessionState};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with_engine, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, Procedure, ServerError, WsConnectionManager};
