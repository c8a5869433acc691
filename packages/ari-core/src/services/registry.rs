//! Process-wide guild session registry.
//!
//! # Concurrency design
//!
//! - `sessions` is a `DashMap` so lookups for different guilds never contend.
//! - Each guild's [`GuildSession`] sits behind its own `tokio::sync::Mutex`.
//!   Procedures and engine notifications for one guild queue on that lock
//!   in FIFO order; engine round-trips are awaited while holding it, which
//!   blocks only that guild.
//! - Teardown marks the session closed and removes it from the map while
//!   still holding the lock. Anything that was queued behind the teardown
//!   observes the closed flag and fails with `GuildNotConnected`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::session::{GuildSession, SessionContext, SessionState};
use crate::engine::EngineEvent;
use crate::entry::{Aid, Eid, QueueEntry, Whence};
use crate::error::{AriError, AriResult};
use crate::protocol_constants::MAX_ENTRIES_PER_PAGE;
use crate::runtime::TaskSpawner;
use crate::types::{ChannelId, GuildId};

/// Serialization point for one guild.
pub struct SessionHandle {
    guild_id: GuildId,
    session: Mutex<GuildSession>,
}

impl SessionHandle {
    fn new(session: GuildSession) -> Self {
        Self {
            guild_id: session.guild_id(),
            session: Mutex::new(session),
        }
    }

    /// Locks the session, failing if it is not (or no longer) connected.
    pub async fn lock(&self) -> AriResult<MutexGuard<'_, GuildSession>> {
        let session = self.session.lock().await;
        if !session.is_connected() {
            return Err(AriError::GuildNotConnected(self.guild_id));
        }
        Ok(session)
    }
}

/// Maps guild ids to their live sessions.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<SessionHandle>>,
    ctx: SessionContext,
}

impl SessionRegistry {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            sessions: DashMap::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    fn get(&self, guild_id: GuildId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&guild_id).map(|e| Arc::clone(e.value()))
    }

    fn handle(&self, guild_id: GuildId) -> AriResult<Arc<SessionHandle>> {
        self.get(guild_id)
            .ok_or(AriError::GuildNotConnected(guild_id))
    }

    /// Removes `handle` from the map unless it was already replaced.
    fn remove(&self, handle: &Arc<SessionHandle>) {
        self.sessions
            .remove_if(&handle.guild_id, |_, current| Arc::ptr_eq(current, handle));
    }

    fn check_page_size(entries_per_page: usize) -> AriResult<()> {
        if entries_per_page > MAX_ENTRIES_PER_PAGE {
            return Err(AriError::InvalidRequest(format!(
                "entries_per_page must be <= {}",
                MAX_ENTRIES_PER_PAGE
            )));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────

    /// Connects a guild to a voice channel, creating its session if needed.
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> AriResult<()> {
        loop {
            let handle = Arc::clone(
                self.sessions
                    .entry(guild_id)
                    .or_insert_with(|| {
                        Arc::new(SessionHandle::new(GuildSession::new(
                            guild_id,
                            &self.ctx.config,
                        )))
                    })
                    .value(),
            );

            let mut session = handle.session.lock().await;
            if session.is_closed() {
                // Torn down while we waited; the map no longer holds it.
                continue;
            }

            let fresh = !session.is_connected();
            let result = session.connect(&self.ctx, channel_id).await;
            match result {
                Ok(()) if fresh => {
                    log::info!(
                        "[Registry] Guild {} connected to channel {} (sessions: {})",
                        guild_id,
                        channel_id,
                        self.sessions.len()
                    );
                }
                Err(ref e) if fresh => {
                    log::warn!("[Registry] Guild {} failed to join: {}", guild_id, e);
                    session.teardown(&self.ctx);
                    self.remove(&handle);
                }
                _ => {}
            }
            return result;
        }
    }

    /// Leaves voice and discards the guild's session.
    ///
    /// If the engine refuses the leave command the session is kept.
    pub async fn disconnect(&self, guild_id: GuildId) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.disconnect(&self.ctx).await?;
        self.remove(&handle);
        log::info!("[Registry] Guild {} disconnected", guild_id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub async fn queue(
        &self,
        guild_id: GuildId,
        page: usize,
        entries_per_page: usize,
    ) -> AriResult<Vec<QueueEntry>> {
        Self::check_page_size(entries_per_page)?;
        let handle = self.handle(guild_id)?;
        let session = handle.lock().await?;
        Ok(session.queue_page(page, entries_per_page))
    }

    pub async fn history(
        &self,
        guild_id: GuildId,
        page: usize,
        entries_per_page: usize,
    ) -> AriResult<Vec<QueueEntry>> {
        Self::check_page_size(entries_per_page)?;
        let handle = self.handle(guild_id)?;
        let session = handle.lock().await?;
        Ok(session.history_page(page, entries_per_page))
    }

    pub async fn state(&self, guild_id: GuildId) -> AriResult<SessionState> {
        let handle = self.handle(guild_id)?;
        let session = handle.lock().await?;
        Ok(session.state())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    pub async fn enqueue(&self, guild_id: GuildId, eid: Eid) -> AriResult<Aid> {
        if eid.as_str().trim().is_empty() {
            return Err(AriError::InvalidRequest("eid must not be empty".into()));
        }
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.enqueue(&self.ctx, eid).await
    }

    pub async fn dequeue(&self, guild_id: GuildId, aid: Aid) -> AriResult<bool> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        Ok(session.dequeue(&self.ctx, aid))
    }

    pub async fn move_entry(
        &self,
        guild_id: GuildId,
        aid: Aid,
        index: i64,
        whence: Whence,
    ) -> AriResult<bool> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        Ok(session.move_entry(&self.ctx, aid, index, whence))
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> AriResult<usize> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        Ok(session.clear_queue(&self.ctx))
    }

    pub async fn shuffle_queue(&self, guild_id: GuildId) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.shuffle_queue(&self.ctx);
        Ok(())
    }

    pub async fn pause(&self, guild_id: GuildId, paused: bool) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.pause(&self.ctx, paused).await
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: f32) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.set_volume(&self.ctx, volume).await
    }

    pub async fn seek(&self, guild_id: GuildId, position: f64) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.seek(&self.ctx, position).await
    }

    pub async fn skip_next(&self, guild_id: GuildId) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.skip_next(&self.ctx).await
    }

    pub async fn skip_previous(&self, guild_id: GuildId) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.skip_previous(&self.ctx).await
    }

    pub async fn stop(&self, guild_id: GuildId) -> AriResult<()> {
        let handle = self.handle(guild_id)?;
        let mut session = handle.lock().await?;
        session.stop(&self.ctx).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Engine notifications
    // ─────────────────────────────────────────────────────────────────────

    /// Applies an engine notification to its guild's session.
    ///
    /// Notifications are never rejected. Those for guilds without a live
    /// session are logged and dropped.
    pub async fn handle_engine_event(&self, event: EngineEvent) {
        let guild_id = event.guild_id();
        let Some(handle) = self.get(guild_id) else {
            log::warn!(
                "[Registry] Dropping engine event for unknown guild {}: {:?}",
                guild_id,
                event
            );
            return;
        };
        let Ok(mut session) = handle.lock().await else {
            log::warn!(
                "[Registry] Dropping engine event for closed guild {}: {:?}",
                guild_id,
                event
            );
            return;
        };

        match event {
            EngineEvent::TrackEnd { reason, .. } => {
                session.on_track_end(&self.ctx, reason).await;
            }
            EngineEvent::PlayerUpdate {
                position,
                paused,
                volume,
                ..
            } => {
                session.on_player_update(&self.ctx, position, paused, volume);
            }
            EngineEvent::Error { reason, .. } => {
                log::warn!("[Registry] Engine error in guild {}: {}", guild_id, reason);
            }
            EngineEvent::VoiceClosed { code, reason, .. } => {
                log::warn!(
                    "[Registry] Voice closed for guild {} (code: {:?}, reason: {:?})",
                    guild_id,
                    code,
                    reason
                );
                session.teardown(&self.ctx);
                self.remove(&handle);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Disconnects sessions that have been idle for at least `timeout`.
    ///
    /// Busy sessions are skipped and picked up by a later sweep.
    /// Returns the number of sessions disposed.
    pub async fn sweep_idle(&self, timeout: Duration) -> usize {
        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut disposed = 0;
        for handle in handles {
            let Ok(mut session) = handle.session.try_lock() else {
                continue;
            };
            if !session.is_idle() || session.idle_for() < timeout {
                continue;
            }
            match session.disconnect(&self.ctx).await {
                Ok(()) => {
                    self.remove(&handle);
                    disposed += 1;
                    log::info!(
                        "[Registry] Guild {} disconnected after {:?} idle",
                        handle.guild_id,
                        timeout
                    );
                }
                Err(e) => {
                    log::warn!(
                        "[Registry] Idle disconnect of guild {} failed: {}",
                        handle.guild_id,
                        e
                    );
                }
            }
        }
        disposed
    }

    /// Starts the idle sweeper if an idle timeout is configured.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, cancel: CancellationToken) {
        let Some(timeout) = self.ctx.config.idle_timeout() else {
            return;
        };
        let period = (timeout / 4).max(Duration::from_secs(1));
        let registry = Arc::clone(self);

        self.ctx.spawner.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            log::info!("[Registry] Idle sweeper started (timeout: {:?})", timeout);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        registry.sweep_idle(timeout).await;
                    }
                }
            }
        });
    }

    /// Disconnects every session. Sessions whose leave fails are torn
    /// down locally anyway.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for handle in handles {
            let mut session = handle.session.lock().await;
            if session.is_closed() {
                continue;
            }
            if let Err(e) = session.disconnect(&self.ctx).await {
                log::warn!(
                    "[Registry] Leave failed for guild {} during shutdown: {}",
                    handle.guild_id,
                    e
                );
                session.teardown(&self.ctx);
            }
            self.remove(&handle);
        }
    }
}
