//! Fakes shared by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::AppState;
use crate::engine::{AudioEngine, EngineError, EngineResult, PlayedTrack};
use crate::entry::Eid;
use crate::events::{BroadcastEventBridge, EngineStatusEvent, EventEmitter, PlayerEvent};
use crate::runtime::TokioSpawner;
use crate::services::{EngineHealthMonitor, SessionContext, SessionRegistry};
use crate::state::Config;
use crate::types::{ChannelId, GuildId};

/// Command as seen by [`MockEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Join(GuildId, ChannelId),
    Leave(GuildId),
    Play(GuildId, String),
    Pause(GuildId, bool),
    Volume(GuildId, f32),
    Seek(GuildId, Duration),
    Stop(GuildId),
    Ping,
}

/// Records every command; fails all of them while `fail` is set.
#[derive(Default)]
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    fail: AtomicBool,
    track_duration: Mutex<Option<Duration>>,
    delay: Mutex<Option<Duration>>,
}

impl MockEngine {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_track_duration(&self, duration: Option<Duration>) {
        *self.track_duration.lock() = duration;
    }

    /// Makes every command take `delay` before it is answered.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    async fn record(&self, call: EngineCall) -> EngineResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::HttpStatus(503, "mock engine down".into()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl AudioEngine for MockEngine {
    async fn join(&self, guild: GuildId, channel: ChannelId) -> EngineResult<()> {
        self.record(EngineCall::Join(guild, channel)).await
    }

    async fn leave(&self, guild: GuildId) -> EngineResult<()> {
        self.record(EngineCall::Leave(guild)).await
    }

    async fn play(&self, guild: GuildId, eid: &Eid, _start: Duration) -> EngineResult<PlayedTrack> {
        self.record(EngineCall::Play(guild, eid.to_string())).await?;
        Ok(PlayedTrack {
            duration: *self.track_duration.lock(),
        })
    }

    async fn pause(&self, guild: GuildId, paused: bool) -> EngineResult<()> {
        self.record(EngineCall::Pause(guild, paused)).await
    }

    async fn set_volume(&self, guild: GuildId, volume: f32) -> EngineResult<()> {
        self.record(EngineCall::Volume(guild, volume)).await
    }

    async fn seek(&self, guild: GuildId, position: Duration) -> EngineResult<()> {
        self.record(EngineCall::Seek(guild, position)).await
    }

    async fn stop(&self, guild: GuildId) -> EngineResult<()> {
        self.record(EngineCall::Stop(guild)).await
    }

    async fn ping(&self) -> EngineResult<()> {
        self.record(EngineCall::Ping).await
    }
}

/// Keeps every emitted event in order.
#[derive(Default)]
pub struct RecordingEmitter {
    player: Mutex<Vec<PlayerEvent>>,
    engine: Mutex<Vec<EngineStatusEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<PlayerEvent> {
        self.player.lock().clone()
    }

    /// Wire names of recorded player events, ignoring play updates.
    pub fn transitions(&self) -> Vec<&'static str> {
        self.player
            .lock()
            .iter()
            .map(PlayerEvent::name)
            .filter(|name| *name != "on_play_update")
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.player.lock().iter().map(PlayerEvent::name).collect()
    }

    pub fn engine_events(&self) -> Vec<EngineStatusEvent> {
        self.engine.lock().clone()
    }

    pub fn clear(&self) {
        self.player.lock().clear();
        self.engine.lock().clear();
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_player(&self, event: PlayerEvent) {
        self.player.lock().push(event);
    }

    fn emit_engine(&self, event: EngineStatusEvent) {
        self.engine.lock().push(event);
    }
}

/// API state wired to a [`MockEngine`] with default configuration.
///
/// Must be called inside a tokio runtime.
pub fn test_app_state() -> (AppState, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::default());
    let bridge = Arc::new(BroadcastEventBridge::new(64));
    let ctx = SessionContext {
        engine: engine.clone(),
        emitter: bridge.clone(),
        config: Arc::new(Config::default()),
        spawner: TokioSpawner::current(),
    };
    let health = Arc::new(EngineHealthMonitor::new(engine.clone(), bridge.clone()));
    let state = AppState::builder()
        .registry(Arc::new(SessionRegistry::new(ctx)))
        .health(health)
        .event_bridge(bridge)
        .build()
        .expect("test state");
    (state, engine)
}
