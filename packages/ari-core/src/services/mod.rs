//! Application services layer.
//!
//! This module contains the session state machine and the services that
//! own it, sitting between the API layer and the audio engine adapter.

pub mod health;
pub mod play_update;
pub mod registry;
pub mod session;

pub use health::{EngineHealthMonitor, HealthState};
pub use play_update::PlaybackSnapshot;
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{GuildSession, SessionContext, SessionState};
