//! Periodic `on_play_update` emission.
//!
//! One ticker runs per guild while that guild is playing (current entry set,
//! not paused). The session publishes a [`PlaybackSnapshot`] through a
//! `watch` channel after every committed transition; the ticker only reads
//! it, so it never contends for the guild lock.
//!
//! Delivery is best effort. The snapshot and the cancel token are checked
//! again right before each emit, but a transition committed on another
//! worker between that check and the emit can still trail one stale update.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::entry::{Aid, QueueEntry};
use crate::events::{EventEmitter, PlayerEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::types::GuildId;

/// Point-in-time view of what a guild is playing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub entry: QueueEntry,
    /// Position at `captured_at`.
    pub position: Duration,
    pub captured_at: Instant,
    pub duration: Option<Duration>,
    pub paused: bool,
    pub volume: f32,
}

impl PlaybackSnapshot {
    /// Extrapolated position, capped at the track length when known.
    pub fn position_now(&self) -> Duration {
        let position = if self.paused {
            self.position
        } else {
            self.position + self.captured_at.elapsed()
        };
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

/// Spawns the ticker for `guild_id`. It stops when `cancel` fires.
pub(crate) fn spawn_play_updates(
    spawner: &TokioSpawner,
    guild_id: GuildId,
    emitter: Arc<dyn EventEmitter>,
    snapshot: watch::Receiver<Option<PlaybackSnapshot>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    spawner.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::debug!("[PlayUpdate] Ticker started for guild {}", guild_id);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let current = snapshot.borrow().clone();
                    let Some(current) = current else { continue };
                    if current.paused {
                        continue;
                    }
                    let aid = current.entry.aid;
                    let event = PlayerEvent::PlayUpdate {
                        guild_id,
                        position: current.position_now().as_secs_f64(),
                        paused: current.paused,
                        volume: current.volume,
                        entry: current.entry,
                    };
                    if still_playing(&snapshot, aid, &cancel) {
                        emitter.emit_player(event);
                    }
                }
            }
        }

        log::debug!("[PlayUpdate] Ticker stopped for guild {}", guild_id);
    });
}

/// True while `aid` is still the unpaused current entry and the ticker has
/// not been cancelled.
fn still_playing(
    snapshot: &watch::Receiver<Option<PlaybackSnapshot>>,
    aid: Aid,
    cancel: &CancellationToken,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    matches!(&*snapshot.borrow(), Some(s) if s.entry.aid == aid && !s.paused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Eid, Entry};
    use crate::test_support::RecordingEmitter;

    fn snapshot(paused: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            entry: QueueEntry {
                aid: Aid(1),
                entry: Entry::new(Eid::from("a")),
            },
            position: Duration::from_secs(10),
            captured_at: Instant::now(),
            duration: Some(Duration::from_secs(60)),
            paused,
            volume: 80.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_on_interval_until_cancelled() {
        let emitter = Arc::new(RecordingEmitter::default());
        let (_tx, rx) = watch::channel(Some(snapshot(false)));
        let cancel = CancellationToken::new();

        spawn_play_updates(
            &TokioSpawner::current(),
            GuildId(1),
            emitter.clone(),
            rx,
            Duration::from_secs(5),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(15_100)).await;
        assert_eq!(emitter.names(), vec!["on_play_update"; 3]);

        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(emitter.events().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_extrapolated_position() {
        let emitter = Arc::new(RecordingEmitter::default());
        let (_tx, rx) = watch::channel(Some(snapshot(false)));
        let cancel = CancellationToken::new();

        spawn_play_updates(
            &TokioSpawner::current(),
            GuildId(3),
            emitter.clone(),
            rx,
            Duration::from_secs(5),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        cancel.cancel();

        match emitter.events().first() {
            Some(PlayerEvent::PlayUpdate { position, .. }) => {
                assert!((*position - 15.0).abs() < 0.5, "position was {position}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn skips_when_nothing_is_playing() {
        let emitter = Arc::new(RecordingEmitter::default());
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        spawn_play_updates(
            &TokioSpawner::current(),
            GuildId(2),
            emitter.clone(),
            rx,
            Duration::from_secs(1),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(emitter.events().is_empty());

        tx.send_replace(Some(snapshot(true)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(emitter.events().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn update_is_dropped_once_playback_moves_on() {
        let (tx, rx) = watch::channel(Some(snapshot(false)));
        let cancel = CancellationToken::new();
        assert!(still_playing(&rx, Aid(1), &cancel));
        assert!(!still_playing(&rx, Aid(2), &cancel));

        tx.send_replace(Some(snapshot(true)));
        assert!(!still_playing(&rx, Aid(1), &cancel));

        tx.send_replace(None);
        assert!(!still_playing(&rx, Aid(1), &cancel));

        tx.send_replace(Some(snapshot(false)));
        cancel.cancel();
        assert!(!still_playing(&rx, Aid(1), &cancel));
    }

    #[test]
    fn position_is_capped_at_duration() {
        let mut snap = snapshot(true);
        snap.position = Duration::from_secs(90);
        assert_eq!(snap.position_now(), Duration::from_secs(60));
    }
}
