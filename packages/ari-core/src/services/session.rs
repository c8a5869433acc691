//! Per-guild session state machine.
//!
//! A [`GuildSession`] owns one guild's queue, history and playback state.
//! Every transition follows the same order:
//!
//! 1. validate arguments against the current state
//! 2. issue the engine command and wait for it to be accepted
//! 3. commit the local mutation
//! 4. emit one event per committed change
//!
//! A failure in steps 1-2 leaves the session untouched. Callers serialize
//! access through [`super::SessionHandle`], so a session never sees two
//! transitions at once.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::play_update::{spawn_play_updates, PlaybackSnapshot};
use crate::engine::{AudioEngine, PlayedTrack, TrackEndReason};
use crate::entry::{Aid, Eid, Entry, History, Queue, QueueEntry, Whence};
use crate::error::{AriError, AriResult};
use crate::events::{EventEmitter, PlayerEvent};
use crate::runtime::TokioSpawner;
use crate::state::Config;
use crate::types::{ChannelId, GuildId};
use crate::utils::secs_to_duration;

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub engine: Arc<dyn AudioEngine>,
    pub emitter: Arc<dyn EventEmitter>,
    pub config: Arc<Config>,
    pub spawner: TokioSpawner,
}

/// The entry being played and where playback stands.
#[derive(Debug, Clone)]
struct NowPlaying {
    entry: QueueEntry,
    duration: Option<Duration>,
    /// Position at `position_at`.
    position: Duration,
    position_at: Instant,
}

impl NowPlaying {
    fn new(entry: QueueEntry, track: PlayedTrack, start: Duration) -> Self {
        Self {
            entry,
            duration: track.duration,
            position: start,
            position_at: Instant::now(),
        }
    }

    fn position(&self, paused: bool) -> Duration {
        let position = if paused {
            self.position
        } else {
            self.position + self.position_at.elapsed()
        };
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn set_position(&mut self, position: Duration) {
        self.position = position;
        self.position_at = Instant::now();
    }
}

/// Read-only view of a session, as returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub paused: bool,
    pub volume: f32,
    pub current: Option<QueueEntry>,
    /// Seconds.
    pub position: f64,
    /// Seconds, when the track length is known.
    pub duration: Option<f64>,
    pub queue_len: usize,
    pub history_len: usize,
}

/// Authoritative playback state for one guild.
pub struct GuildSession {
    guild_id: GuildId,
    channel_id: Option<ChannelId>,
    closed: bool,
    paused: bool,
    volume: f32,
    current: Option<NowPlaying>,
    queue: Queue,
    history: History,
    last_active: Instant,
    snapshot_tx: watch::Sender<Option<PlaybackSnapshot>>,
    ticker: Option<CancellationToken>,
}

impl GuildSession {
    /// Creates a session that has not joined voice yet.
    pub fn new(guild_id: GuildId, config: &Config) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            guild_id,
            channel_id: None,
            closed: false,
            paused: false,
            volume: config.default_volume,
            current: None,
            queue: Queue::new(),
            history: History::new(config.max_history),
            last_active: Instant::now(),
            snapshot_tx,
            ticker: None,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Joined voice and not torn down.
    pub fn is_connected(&self) -> bool {
        !self.closed && self.channel_id.is_some()
    }

    /// Connected with nothing current.
    pub fn is_idle(&self) -> bool {
        self.is_connected() && self.current.is_none()
    }

    /// How long the session has been without a transition.
    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub fn state(&self) -> SessionState {
        let current = self.current.as_ref();
        SessionState {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            paused: self.paused,
            volume: self.volume,
            current: current.map(|c| c.entry.clone()),
            position: current
                .map(|c| c.position(self.paused).as_secs_f64())
                .unwrap_or(0.0),
            duration: current.and_then(|c| c.duration).map(|d| d.as_secs_f64()),
            queue_len: self.queue.len(),
            history_len: self.history.len(),
        }
    }

    pub fn queue_page(&self, page: usize, entries_per_page: usize) -> Vec<QueueEntry> {
        self.queue.page(page, entries_per_page)
    }

    pub fn history_page(&self, page: usize, entries_per_page: usize) -> Vec<QueueEntry> {
        self.history.page(page, entries_per_page)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────

    /// Binds the session to a voice channel.
    ///
    /// Idempotent for the current channel; a different channel re-joins.
    pub async fn connect(&mut self, ctx: &SessionContext, channel_id: ChannelId) -> AriResult<()> {
        if self.channel_id == Some(channel_id) {
            return Ok(());
        }
        ctx.engine.join(self.guild_id, channel_id).await?;

        self.channel_id = Some(channel_id);
        self.emit(
            ctx,
            PlayerEvent::Connect {
                guild_id: self.guild_id,
                channel_id,
            },
        );
        self.committed(ctx);
        Ok(())
    }

    /// Leaves voice and tears the session down.
    pub async fn disconnect(&mut self, ctx: &SessionContext) -> AriResult<()> {
        ctx.engine.leave(self.guild_id).await?;
        self.teardown(ctx);
        Ok(())
    }

    /// Tears the session down without talking to the engine.
    ///
    /// Cancels the play-update ticker and marks the session closed so that
    /// callers still waiting on the lock are turned away.
    pub fn teardown(&mut self, ctx: &SessionContext) {
        if self.closed {
            return;
        }
        self.stop_ticker();
        self.snapshot_tx.send_replace(None);
        self.closed = true;
        self.current = None;
        self.queue.clear();
        if self.channel_id.is_some() {
            self.emit(
                ctx,
                PlayerEvent::Disconnect {
                    guild_id: self.guild_id,
                },
            );
        }
        log::info!("[Session] Guild {} torn down", self.guild_id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────

    /// Appends `eid` to the queue, starting playback if nothing is current.
    pub async fn enqueue(&mut self, ctx: &SessionContext, eid: Eid) -> AriResult<Aid> {
        let max = ctx.config.max_queue_len;
        if max > 0 && self.queue.len() >= max {
            return Err(AriError::InvalidRequest(format!(
                "queue is full ({} entries)",
                max
            )));
        }

        let entry = Entry::new(eid);
        let promoted = if self.current.is_none() {
            // An idle session always plays its queue head; normally that is the new entry.
            let next = self
                .queue
                .front()
                .map(|e| e.eid().clone())
                .unwrap_or_else(|| entry.eid.clone());
            Some(ctx.engine.play(self.guild_id, &next, Duration::ZERO).await?)
        } else {
            None
        };

        let (queued, position) = self.queue.enqueue(entry);
        let aid = queued.aid;
        self.emit(
            ctx,
            PlayerEvent::QueueAdd {
                guild_id: self.guild_id,
                entry: queued,
                position,
            },
        );

        if let Some(track) = promoted {
            if let Some(next) = self.queue.pop_front() {
                self.start(ctx, next, track);
            }
        }
        self.committed(ctx);
        Ok(aid)
    }

    /// Removes a queued entry. Returns whether anything was removed.
    pub fn dequeue(&mut self, ctx: &SessionContext, aid: Aid) -> bool {
        let Some((position, entry)) = self.queue.dequeue(aid) else {
            return false;
        };
        self.emit(
            ctx,
            PlayerEvent::QueueRemove {
                guild_id: self.guild_id,
                entry,
                position,
            },
        );
        self.committed(ctx);
        true
    }

    /// Moves a queued entry. Returns whether the entry exists.
    pub fn move_entry(&mut self, ctx: &SessionContext, aid: Aid, index: i64, whence: Whence) -> bool {
        let Some(moved) = self.queue.move_entry(aid, index, whence) else {
            return false;
        };
        if moved.from != moved.to {
            self.emit(
                ctx,
                PlayerEvent::QueueMove {
                    guild_id: self.guild_id,
                    aid: moved.entry.aid,
                    from: moved.from,
                    to: moved.to,
                },
            );
            self.committed(ctx);
        }
        true
    }

    /// Drops every queued entry. Returns how many were removed.
    pub fn clear_queue(&mut self, ctx: &SessionContext) -> usize {
        let removed = self.queue.clear();
        if removed > 0 {
            self.emit(
                ctx,
                PlayerEvent::QueueClear {
                    guild_id: self.guild_id,
                    removed,
                },
            );
            self.committed(ctx);
        }
        removed
    }

    pub fn shuffle_queue(&mut self, ctx: &SessionContext) {
        if self.queue.len() < 2 {
            return;
        }
        self.queue.shuffle();
        self.emit(
            ctx,
            PlayerEvent::QueueShuffle {
                guild_id: self.guild_id,
            },
        );
        self.committed(ctx);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────────────

    /// Moves the current entry to history and plays the queue head.
    pub async fn skip_next(&mut self, ctx: &SessionContext) -> AriResult<()> {
        match self.queue.front().map(|e| e.eid().clone()) {
            Some(next_eid) => {
                let track = ctx.engine.play(self.guild_id, &next_eid, Duration::ZERO).await?;
                self.retire_current(ctx);
                if let Some(next) = self.queue.pop_front() {
                    self.start(ctx, next, track);
                }
            }
            None if self.current.is_some() => {
                ctx.engine.stop(self.guild_id).await?;
                self.retire_current(ctx);
                self.become_idle(ctx);
            }
            None => return Ok(()),
        }
        self.committed(ctx);
        Ok(())
    }

    /// Replays the most recent history entry, pushing the current one back
    /// onto the queue head.
    pub async fn skip_previous(&mut self, ctx: &SessionContext) -> AriResult<()> {
        let Some(prev_eid) = self.history.front().map(|e| e.eid().clone()) else {
            return Ok(());
        };
        let track = ctx.engine.play(self.guild_id, &prev_eid, Duration::ZERO).await?;

        let Some(previous) = self.history.pop_front() else {
            return Ok(());
        };
        self.emit(
            ctx,
            PlayerEvent::HistoryRemove {
                guild_id: self.guild_id,
                entry: previous.clone(),
            },
        );
        if let Some(current) = self.current.take() {
            self.queue.push_front(current.entry.clone());
            self.emit(
                ctx,
                PlayerEvent::QueueAdd {
                    guild_id: self.guild_id,
                    entry: current.entry,
                    position: 0,
                },
            );
        }
        self.start(ctx, previous, track);
        self.committed(ctx);
        Ok(())
    }

    /// Pauses or resumes the current entry. No-op if already in that state.
    pub async fn pause(&mut self, ctx: &SessionContext, paused: bool) -> AriResult<()> {
        if self.current.is_none() {
            return Err(AriError::StateConflict("nothing is playing".into()));
        }
        if self.paused == paused {
            return Ok(());
        }
        ctx.engine.pause(self.guild_id, paused).await?;

        self.set_paused(ctx, paused);
        self.committed(ctx);
        Ok(())
    }

    /// Sets the volume, clamped to the configured range.
    pub async fn set_volume(&mut self, ctx: &SessionContext, volume: f32) -> AriResult<()> {
        if !volume.is_finite() {
            return Err(AriError::InvalidRequest(format!(
                "volume must be a finite number, got {}",
                volume
            )));
        }
        let volume = ctx.config.clamp_volume(volume);
        if volume == self.volume {
            return Ok(());
        }
        ctx.engine.set_volume(self.guild_id, volume).await?;

        self.apply_volume(ctx, volume);
        self.committed(ctx);
        Ok(())
    }

    /// Seeks within the current entry. `position` is in seconds.
    pub async fn seek(&mut self, ctx: &SessionContext, position: f64) -> AriResult<()> {
        let requested = secs_to_duration(position).ok_or_else(|| {
            AriError::InvalidRequest(format!("position must be a finite number, got {}", position))
        })?;
        let Some(ref current) = self.current else {
            return Err(AriError::StateConflict("nothing is playing".into()));
        };

        let out_of_bounds =
            position < 0.0 || current.duration.is_some_and(|duration| requested > duration);
        if out_of_bounds && ctx.config.strict_seek {
            return Err(AriError::InvalidRange(format!(
                "cannot seek to {:.3}s in {}",
                position, current.entry
            )));
        }
        let target = match current.duration {
            Some(duration) => requested.min(duration),
            None => requested,
        };
        ctx.engine.seek(self.guild_id, target).await?;

        if let Some(ref mut current) = self.current {
            current.set_position(target);
        }
        self.emit(
            ctx,
            PlayerEvent::Seek {
                guild_id: self.guild_id,
                position: target.as_secs_f64(),
            },
        );
        self.committed(ctx);
        Ok(())
    }

    /// Stops playback. Queue and history are kept.
    pub async fn stop(&mut self, ctx: &SessionContext) -> AriResult<()> {
        if self.current.is_none() {
            return Ok(());
        }
        ctx.engine.stop(self.guild_id).await?;

        self.current = None;
        self.become_idle(ctx);
        self.committed(ctx);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Engine notifications
    // ─────────────────────────────────────────────────────────────────────

    /// Applies a track-end notification.
    ///
    /// The finished entry always goes to history. Advancing is best effort:
    /// if the next entry cannot be started the session goes idle and the
    /// entry stays at the queue head.
    pub async fn on_track_end(&mut self, ctx: &SessionContext, reason: TrackEndReason) {
        if !reason.may_start_next() {
            log::debug!(
                "[Session] Guild {} ignoring track end ({:?})",
                self.guild_id,
                reason
            );
            return;
        }
        if self.current.is_none() {
            return;
        }
        self.retire_current(ctx);

        let next_eid = self.queue.front().map(|e| e.eid().clone());
        let started = match next_eid {
            Some(eid) => match ctx.engine.play(self.guild_id, &eid, Duration::ZERO).await {
                Ok(track) => self.queue.pop_front().map(|next| (next, track)),
                Err(e) => {
                    log::warn!(
                        "[Session] Guild {} failed to advance to {}: {}",
                        self.guild_id,
                        eid,
                        e
                    );
                    None
                }
            },
            None => None,
        };
        match started {
            Some((next, track)) => self.start(ctx, next, track),
            None => self.become_idle(ctx),
        }
        self.committed(ctx);
    }

    /// Applies a player update. Position is in seconds.
    ///
    /// Disagreeing pause or volume state is adopted from the engine.
    pub fn on_player_update(
        &mut self,
        ctx: &SessionContext,
        position: f64,
        paused: Option<bool>,
        volume: Option<f32>,
    ) {
        let Some(ref mut current) = self.current else {
            return;
        };
        if let Some(position) = secs_to_duration(position) {
            current.set_position(position);
        }
        if let Some(paused) = paused.filter(|p| *p != self.paused) {
            log::info!(
                "[Session] Guild {} reconciling pause state to {}",
                self.guild_id,
                paused
            );
            self.set_paused(ctx, paused);
        }
        if let Some(volume) = volume
            .filter(|v| v.is_finite())
            .map(|v| ctx.config.clamp_volume(v))
            .filter(|v| *v != self.volume)
        {
            self.apply_volume(ctx, volume);
        }
        self.publish_snapshot();
        self.sync_ticker(ctx);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn emit(&self, ctx: &SessionContext, event: PlayerEvent) {
        ctx.emitter.emit_player(event);
    }

    /// Makes `entry` current. The pause flag is cleared since the engine
    /// starts new tracks unpaused.
    fn start(&mut self, ctx: &SessionContext, entry: QueueEntry, track: PlayedTrack) {
        if self.paused {
            self.set_paused(ctx, false);
        }
        self.current = Some(NowPlaying::new(entry.clone(), track, Duration::ZERO));
        self.emit(
            ctx,
            PlayerEvent::Play {
                guild_id: self.guild_id,
                entry,
            },
        );
    }

    /// Moves the current entry, if any, to the front of history.
    fn retire_current(&mut self, ctx: &SessionContext) {
        let Some(current) = self.current.take() else {
            return;
        };
        let evicted = self.history.add(current.entry.clone());
        if !evicted.is_empty() {
            log::debug!(
                "[Session] Guild {} evicted {} history entries",
                self.guild_id,
                evicted.len()
            );
        }
        self.emit(
            ctx,
            PlayerEvent::HistoryAdd {
                guild_id: self.guild_id,
                entry: current.entry,
            },
        );
    }

    fn become_idle(&mut self, ctx: &SessionContext) {
        self.paused = false;
        self.emit(
            ctx,
            PlayerEvent::Stop {
                guild_id: self.guild_id,
            },
        );
    }

    fn set_paused(&mut self, ctx: &SessionContext, paused: bool) {
        let was_paused = self.paused;
        if let Some(ref mut current) = self.current {
            let position = current.position(was_paused);
            current.set_position(position);
        }
        self.paused = paused;
        self.emit(
            ctx,
            PlayerEvent::Pause {
                guild_id: self.guild_id,
                paused,
            },
        );
    }

    fn apply_volume(&mut self, ctx: &SessionContext, volume: f32) {
        let old = self.volume;
        self.volume = volume;
        self.emit(
            ctx,
            PlayerEvent::VolumeChange {
                guild_id: self.guild_id,
                old,
                new: volume,
            },
        );
    }

    /// Bookkeeping after a committed transition.
    fn committed(&mut self, ctx: &SessionContext) {
        self.last_active = Instant::now();
        self.publish_snapshot();
        self.sync_ticker(ctx);
    }

    fn publish_snapshot(&self) {
        let snapshot = self.current.as_ref().map(|current| PlaybackSnapshot {
            entry: current.entry.clone(),
            position: current.position,
            captured_at: current.position_at,
            duration: current.duration,
            paused: self.paused,
            volume: self.volume,
        });
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Runs the play-update ticker exactly while playing.
    fn sync_ticker(&mut self, ctx: &SessionContext) {
        let playing = !self.closed && self.current.is_some() && !self.paused;
        match (playing, self.ticker.is_some()) {
            (true, false) => {
                let cancel = CancellationToken::new();
                spawn_play_updates(
                    &ctx.spawner,
                    self.guild_id,
                    Arc::clone(&ctx.emitter),
                    self.snapshot_tx.subscribe(),
                    ctx.config.play_update_interval(),
                    cancel.clone(),
                );
                self.ticker = Some(cancel);
            }
            (false, true) => self.stop_ticker(),
            _ => {}
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(cancel) = self.ticker.take() {
            cancel.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn ticker_running(&self) -> bool {
        self.ticker.is_some()
    }
}

impl Drop for GuildSession {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioSpawner;
    use crate::test_support::{EngineCall, MockEngine, RecordingEmitter};

    struct Harness {
        engine: Arc<MockEngine>,
        emitter: Arc<RecordingEmitter>,
        ctx: SessionContext,
        session: GuildSession,
    }

    const G: GuildId = GuildId(1);

    async fn harness_with(config: Config) -> Harness {
        let engine = Arc::new(MockEngine::default());
        let emitter = Arc::new(RecordingEmitter::default());
        let config = Arc::new(config);
        let ctx = SessionContext {
            engine: engine.clone(),
            emitter: emitter.clone(),
            config: config.clone(),
            spawner: TokioSpawner::current(),
        };
        let mut session = GuildSession::new(G, &config);
        session.connect(&ctx, ChannelId(10)).await.unwrap();
        emitter.clear();
        Harness {
            engine,
            emitter,
            ctx,
            session,
        }
    }

    async fn harness() -> Harness {
        harness_with(Config::default()).await
    }

    impl Harness {
        async fn enqueue(&mut self, eid: &str) -> Aid {
            self.session.enqueue(&self.ctx, Eid::from(eid)).await.unwrap()
        }

        fn current_eid(&self) -> Option<String> {
            self.session.state().current.map(|e| e.eid().to_string())
        }
    }

    #[tokio::test]
    async fn enqueue_scenario() {
        let mut h = harness().await;

        assert_eq!(h.enqueue("trackA").await, Aid(1));
        assert_eq!(h.current_eid().as_deref(), Some("trackA"));
        assert_eq!(h.emitter.transitions(), vec!["on_queue_add", "on_play"]);
        match &h.emitter.events()[0] {
            PlayerEvent::QueueAdd { entry, position, .. } => {
                assert_eq!(entry.aid, Aid(1));
                assert_eq!(*position, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        h.emitter.clear();
        assert_eq!(h.enqueue("trackB").await, Aid(2));
        assert_eq!(h.emitter.transitions(), vec!["on_queue_add"]);

        h.emitter.clear();
        h.session.skip_next(&h.ctx).await.unwrap();
        assert_eq!(h.current_eid().as_deref(), Some("trackB"));
        assert_eq!(h.emitter.transitions(), vec!["on_history_add", "on_play"]);
        assert_eq!(h.session.history_page(0, 10)[0].eid().as_str(), "trackA");

        h.emitter.clear();
        assert!(!h.session.dequeue(&h.ctx, Aid(2)));
        assert!(h.emitter.transitions().is_empty());
    }

    #[tokio::test]
    async fn enqueued_aids_are_distinct() {
        let mut h = harness().await;
        let mut aids = Vec::new();
        for i in 0..20 {
            aids.push(h.enqueue(&format!("t{i}")).await);
        }
        h.session.skip_next(&h.ctx).await.unwrap();
        aids.push(h.enqueue("again").await);

        let mut sorted = aids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), aids.len());
    }

    #[tokio::test]
    async fn dequeue_twice_returns_true_then_false() {
        let mut h = harness().await;
        h.enqueue("a").await;
        let b = h.enqueue("b").await;
        h.emitter.clear();

        assert!(h.session.dequeue(&h.ctx, b));
        assert!(!h.session.dequeue(&h.ctx, b));
        assert_eq!(h.emitter.transitions(), vec!["on_queue_remove"]);
    }

    #[tokio::test]
    async fn move_emits_once_with_positions() {
        let mut h = harness().await;
        h.enqueue("playing").await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        let c = h.enqueue("c").await;
        h.emitter.clear();

        assert!(h.session.move_entry(&h.ctx, c, 0, Whence::Start));
        assert_eq!(
            h.emitter.events(),
            vec![PlayerEvent::QueueMove {
                guild_id: G,
                aid: c,
                from: 2,
                to: 0
            }]
        );
        assert_eq!(h.session.queue_page(0, 1)[0].aid, c);
        assert_eq!(h.session.state().queue_len, 3);

        h.emitter.clear();
        assert!(h.session.move_entry(&h.ctx, c, 0, Whence::Start));
        assert!(h.emitter.events().is_empty());
        assert!(!h.session.move_entry(&h.ctx, Aid(99), 0, Whence::Start));
    }

    #[tokio::test]
    async fn skip_round_trip_restores_current() {
        let mut h = harness().await;
        let a = h.enqueue("a").await;
        let b = h.enqueue("b").await;

        h.session.skip_next(&h.ctx).await.unwrap();
        h.emitter.clear();
        h.session.skip_previous(&h.ctx).await.unwrap();

        let state = h.session.state();
        assert_eq!(state.current.map(|e| e.aid), Some(a));
        assert_eq!(state.history_len, 0);
        assert_eq!(h.session.queue_page(0, 10)[0].aid, b);
        assert_eq!(
            h.emitter.transitions(),
            vec!["on_history_remove", "on_queue_add", "on_play"]
        );
    }

    #[tokio::test]
    async fn skip_previous_with_empty_history_is_noop() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.emitter.clear();

        h.session.skip_previous(&h.ctx).await.unwrap();
        assert!(h.emitter.events().is_empty());
        assert_eq!(h.current_eid().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn skip_next_on_last_entry_stops() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.emitter.clear();

        h.session.skip_next(&h.ctx).await.unwrap();
        assert_eq!(h.emitter.transitions(), vec!["on_history_add", "on_stop"]);
        assert!(h.session.state().current.is_none());

        h.emitter.clear();
        h.session.skip_next(&h.ctx).await.unwrap();
        assert!(h.emitter.events().is_empty());
    }

    #[tokio::test]
    async fn pause_twice_emits_once() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.emitter.clear();

        h.session.pause(&h.ctx, true).await.unwrap();
        h.session.pause(&h.ctx, true).await.unwrap();
        assert_eq!(h.emitter.transitions(), vec!["on_pause"]);
        assert_eq!(
            h.engine
                .calls()
                .iter()
                .filter(|c| matches!(c, EngineCall::Pause(..)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn pause_without_current_is_state_conflict() {
        let mut h = harness().await;
        let err = h.session.pause(&h.ctx, true).await.unwrap_err();
        assert!(matches!(err, AriError::StateConflict(_)));
    }

    #[tokio::test]
    async fn volume_clamps_and_emits_only_on_change() {
        let mut h = harness_with(Config {
            default_volume: 50.0,
            ..Config::default()
        })
        .await;

        h.session.set_volume(&h.ctx, 150.0).await.unwrap();
        assert_eq!(
            h.emitter.events(),
            vec![PlayerEvent::VolumeChange {
                guild_id: G,
                old: 50.0,
                new: 100.0
            }]
        );

        h.emitter.clear();
        h.session.set_volume(&h.ctx, 150.0).await.unwrap();
        assert!(h.emitter.events().is_empty());

        let err = h.session.set_volume(&h.ctx, f32::NAN).await.unwrap_err();
        assert!(matches!(err, AriError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn seek_requires_current_and_clamps() {
        let mut h = harness().await;
        let err = h.session.seek(&h.ctx, 5.0).await.unwrap_err();
        assert!(matches!(err, AriError::StateConflict(_)));

        h.engine.set_track_duration(Some(Duration::from_secs(60)));
        h.enqueue("a").await;
        h.emitter.clear();

        h.session.seek(&h.ctx, 90.0).await.unwrap();
        assert_eq!(
            h.emitter.events(),
            vec![PlayerEvent::Seek {
                guild_id: G,
                position: 60.0
            }]
        );
        assert!(h
            .engine
            .calls()
            .contains(&EngineCall::Seek(G, Duration::from_secs(60))));
    }

    #[tokio::test]
    async fn strict_seek_rejects_out_of_bounds() {
        let mut h = harness_with(Config {
            strict_seek: true,
            ..Config::default()
        })
        .await;
        h.engine.set_track_duration(Some(Duration::from_secs(30)));
        h.enqueue("a").await;
        h.emitter.clear();

        let err = h.session.seek(&h.ctx, 31.0).await.unwrap_err();
        assert!(matches!(err, AriError::InvalidRange(_)));
        let err = h.session.seek(&h.ctx, -1.0).await.unwrap_err();
        assert!(matches!(err, AriError::InvalidRange(_)));
        assert!(h.emitter.events().is_empty());
    }

    #[tokio::test]
    async fn failed_engine_command_leaves_state_unchanged() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        h.emitter.clear();
        let before = h.session.state();

        h.engine.set_failing(true);
        let err = h.session.skip_next(&h.ctx).await.unwrap_err();
        assert!(matches!(err, AriError::EngineUnavailable(_)));
        let err = h.session.enqueue(&h.ctx, Eid::from("c")).await;
        assert!(err.is_ok(), "enqueue while playing needs no engine call");
        let err = h.session.pause(&h.ctx, true).await.unwrap_err();
        assert!(matches!(err, AriError::EngineUnavailable(_)));

        let after = h.session.state();
        assert_eq!(after.current, before.current);
        assert_eq!(after.history_len, 0);
        assert!(!after.paused);
        assert_eq!(h.emitter.transitions(), vec!["on_queue_add"]);
    }

    #[tokio::test]
    async fn failed_volume_seek_and_stop_leave_state_unchanged() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        h.emitter.clear();
        let before = h.session.state();

        h.engine.set_failing(true);
        let err = h.session.set_volume(&h.ctx, 40.0).await.unwrap_err();
        assert!(matches!(err, AriError::EngineUnavailable(_)));
        let err = h.session.seek(&h.ctx, 1.0).await.unwrap_err();
        assert!(matches!(err, AriError::EngineUnavailable(_)));
        let err = h.session.stop(&h.ctx).await.unwrap_err();
        assert!(matches!(err, AriError::EngineUnavailable(_)));

        let after = h.session.state();
        assert_eq!(after.volume, before.volume);
        assert_eq!(after.position, before.position);
        assert_eq!(after.current, before.current);
        assert_eq!(after.queue_len, before.queue_len);
        assert_eq!(after.history_len, 0);
        assert!(h.emitter.events().is_empty());
    }

    #[tokio::test]
    async fn failed_promotion_rejects_enqueue() {
        let mut h = harness().await;
        h.engine.set_failing(true);

        let err = h.session.enqueue(&h.ctx, Eid::from("a")).await.unwrap_err();
        assert!(matches!(err, AriError::EngineUnavailable(_)));
        assert_eq!(h.session.state().queue_len, 0);
        assert!(h.emitter.events().is_empty());

        h.engine.set_failing(false);
        assert_eq!(h.enqueue("a").await, Aid(1));
    }

    #[tokio::test]
    async fn stop_keeps_queue_and_history() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        h.session.pause(&h.ctx, true).await.unwrap();
        h.emitter.clear();

        h.session.stop(&h.ctx).await.unwrap();
        let state = h.session.state();
        assert!(state.current.is_none());
        assert!(!state.paused);
        assert_eq!(state.queue_len, 1);
        assert_eq!(h.emitter.transitions(), vec!["on_stop"]);

        h.emitter.clear();
        h.session.stop(&h.ctx).await.unwrap();
        assert!(h.emitter.events().is_empty());
    }

    #[tokio::test]
    async fn enqueue_after_stop_plays_queue_head() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        h.session.stop(&h.ctx).await.unwrap();
        h.emitter.clear();

        h.enqueue("c").await;
        assert_eq!(h.current_eid().as_deref(), Some("b"));
        assert_eq!(h.emitter.transitions(), vec!["on_queue_add", "on_play"]);
    }

    #[tokio::test]
    async fn track_end_advances_and_records_history() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        h.emitter.clear();

        h.session.on_track_end(&h.ctx, TrackEndReason::Finished).await;
        assert_eq!(h.current_eid().as_deref(), Some("b"));
        assert_eq!(h.emitter.transitions(), vec!["on_history_add", "on_play"]);

        h.emitter.clear();
        h.session.on_track_end(&h.ctx, TrackEndReason::Finished).await;
        assert!(h.session.state().current.is_none());
        assert_eq!(h.session.state().history_len, 2);
        assert_eq!(h.emitter.transitions(), vec!["on_history_add", "on_stop"]);
    }

    #[tokio::test]
    async fn stale_track_end_is_ignored() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.emitter.clear();

        h.session.on_track_end(&h.ctx, TrackEndReason::Replaced).await;
        h.session.on_track_end(&h.ctx, TrackEndReason::Stopped).await;
        assert!(h.emitter.events().is_empty());
        assert_eq!(h.current_eid().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn track_end_with_failing_engine_goes_idle() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.enqueue("b").await;
        h.emitter.clear();
        h.engine.set_failing(true);

        h.session.on_track_end(&h.ctx, TrackEndReason::Finished).await;
        let state = h.session.state();
        assert!(state.current.is_none());
        assert_eq!(state.queue_len, 1);
        assert_eq!(h.emitter.transitions(), vec!["on_history_add", "on_stop"]);
    }

    #[tokio::test]
    async fn history_is_bounded_through_playback() {
        let mut h = harness_with(Config {
            max_history: 2,
            ..Config::default()
        })
        .await;
        for i in 0..5 {
            h.enqueue(&format!("t{i}")).await;
        }
        for _ in 0..5 {
            h.session.skip_next(&h.ctx).await.unwrap();
            assert!(h.session.state().history_len <= 2);
        }
    }

    #[tokio::test]
    async fn player_update_reconciles_pause_and_volume() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.emitter.clear();

        h.session.on_player_update(&h.ctx, 12.0, Some(false), Some(100.0));
        assert!(h.emitter.events().is_empty());

        h.session.on_player_update(&h.ctx, 12.0, Some(true), Some(40.0));
        assert_eq!(h.emitter.transitions(), vec!["on_pause", "on_volume_change"]);
        let state = h.session.state();
        assert!(state.paused);
        assert_eq!(state.volume, 40.0);
        assert!((state.position - 12.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn player_update_clamps_reported_volume() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.session.set_volume(&h.ctx, 50.0).await.unwrap();
        h.emitter.clear();

        h.session.on_player_update(&h.ctx, 1.0, None, Some(150.0));
        assert_eq!(h.session.state().volume, h.ctx.config.volume_max);
        assert_eq!(h.emitter.transitions(), vec!["on_volume_change"]);

        h.emitter.clear();
        h.session.on_player_update(&h.ctx, 2.0, None, Some(150.0));
        assert!(h.emitter.events().is_empty());
    }

    #[tokio::test]
    async fn ticker_follows_playing_state() {
        let mut h = harness().await;
        assert!(!h.session.ticker_running());

        h.enqueue("a").await;
        assert!(h.session.ticker_running());

        h.session.pause(&h.ctx, true).await.unwrap();
        assert!(!h.session.ticker_running());

        h.session.pause(&h.ctx, false).await.unwrap();
        assert!(h.session.ticker_running());

        h.session.disconnect(&h.ctx).await.unwrap();
        assert!(!h.session.ticker_running());
        assert!(h.session.is_closed());
    }

    #[tokio::test]
    async fn connect_is_idempotent_per_channel() {
        let mut h = harness().await;
        h.session.connect(&h.ctx, ChannelId(10)).await.unwrap();
        assert!(h.emitter.events().is_empty());

        h.session.connect(&h.ctx, ChannelId(11)).await.unwrap();
        assert_eq!(h.emitter.transitions(), vec!["on_connect"]);
        let joins = h
            .engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::Join(..)))
            .count();
        assert_eq!(joins, 2);
    }

    #[tokio::test]
    async fn failed_leave_keeps_session() {
        let mut h = harness().await;
        h.enqueue("a").await;
        h.engine.set_failing(true);

        assert!(h.session.disconnect(&h.ctx).await.is_err());
        assert!(h.session.is_connected());
        assert!(h.session.state().current.is_some());
    }
}
