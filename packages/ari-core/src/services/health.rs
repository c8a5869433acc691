//! Audio engine health monitoring.
//!
//! Pings the engine on a fixed interval and publishes
//! [`EngineStatusEvent::HealthChanged`] whenever reachability flips.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::engine::AudioEngine;
use crate::error::{AriError, AriResult};
use crate::events::{EngineHealth, EngineStatusEvent, EventEmitter};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::utils::now_millis;

/// Last observed engine health.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    pub health: EngineHealth,
    pub reason: Option<String>,
}

/// Tracks whether the audio engine is reachable.
pub struct EngineHealthMonitor {
    engine: Arc<dyn AudioEngine>,
    emitter: Arc<dyn EventEmitter>,
    state: RwLock<HealthState>,
}

impl EngineHealthMonitor {
    pub fn new(engine: Arc<dyn AudioEngine>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            engine,
            emitter,
            state: RwLock::new(HealthState::default()),
        }
    }

    /// Last recorded health, without pinging.
    pub fn health(&self) -> HealthState {
        self.state.read().clone()
    }

    /// Pings the engine and records the outcome.
    pub async fn check(&self) -> HealthState {
        let observed = match self.engine.ping().await {
            Ok(()) => HealthState::default(),
            Err(e) => HealthState {
                health: EngineHealth::Unavailable,
                reason: Some(e.to_string()),
            },
        };
        self.record(observed.clone());
        observed
    }

    fn record(&self, observed: HealthState) {
        let changed = {
            let mut state = self.state.write();
            let changed = state.health != observed.health;
            *state = observed.clone();
            changed
        };
        if !changed {
            return;
        }
        match observed.health {
            EngineHealth::Ok => log::info!("[Health] Audio engine reachable again"),
            EngineHealth::Unavailable => log::warn!(
                "[Health] Audio engine unavailable: {}",
                observed.reason.as_deref().unwrap_or("unknown")
            ),
        }
        self.emitter.emit_engine(EngineStatusEvent::HealthChanged {
            health: observed.health,
            reason: observed.reason,
            timestamp: now_millis(),
        });
    }

    /// Fails unless the engine answers a live ping.
    pub async fn assert_ready(&self) -> AriResult<()> {
        let state = self.check().await;
        match state.health {
            EngineHealth::Ok => Ok(()),
            EngineHealth::Unavailable => Err(AriError::EngineUnavailable(
                state.reason.unwrap_or_else(|| "engine did not answer".into()),
            )),
        }
    }

    /// Starts the periodic ping loop.
    pub fn spawn(self: &Arc<Self>, spawner: &TokioSpawner, interval: Duration, cancel: CancellationToken) {
        let monitor = Arc::clone(self);
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.check().await;
                    }
                }
            }
            log::debug!("[Health] Monitor stopped");
        });
    }
}
