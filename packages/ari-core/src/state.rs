//! Core configuration types.
//!
//! [`Config`] holds every tunable the orchestrator reads at runtime. It is
//! deserialised by the server binary and shared read-only afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for the audio engine node.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the engine's REST interface.
    pub url: String,

    /// Value sent in the `Authorization` header, if the node requires one.
    pub password: Option<String>,

    /// Per-request timeout (seconds).
    pub timeout_secs: u64,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000".to_string(),
            password: None,
            timeout_secs: 10,
        }
    }
}

/// Configuration for the Ari orchestrator.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server (0 = auto-allocate).
    pub bind_port: u16,

    /// Origin prefixes allowed by CORS.
    pub trusted_origins: Vec<String>,

    // Engine
    pub engine: EngineConfig,

    // Session
    /// Maximum number of entries kept in each guild's history.
    pub max_history: usize,

    /// Maximum queue length per guild (0 = unbounded).
    pub max_queue_len: usize,

    /// Lower bound of the accepted volume range.
    pub volume_min: f32,

    /// Upper bound of the accepted volume range.
    pub volume_max: f32,

    /// Volume a fresh session starts at.
    pub default_volume: f32,

    /// Interval between `on_play_update` events while playing (milliseconds).
    pub play_update_interval_ms: u64,

    /// Reject out-of-bounds seeks instead of clamping them.
    pub strict_seek: bool,

    /// Disconnect sessions idle for this long (seconds, 0 = never).
    pub idle_timeout_secs: u64,

    // Health
    /// Interval between engine health pings (seconds).
    pub health_check_interval_secs: u64,

    // Events / WebSocket
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// WebSocket heartbeat timeout (seconds).
    pub ws_heartbeat_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: 49500,
            trusted_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            engine: EngineConfig::default(),
            max_history: 100,
            max_queue_len: 0,
            volume_min: 0.0,
            volume_max: 100.0,
            default_volume: 100.0,
            play_update_interval_ms: 5000,
            strict_seek: false,
            idle_timeout_secs: 0,
            health_check_interval_secs: 30,
            event_channel_capacity: 256,
            ws_heartbeat_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.engine.url.trim().is_empty() {
            return Err("engine.url must not be empty".to_string());
        }
        if !self.volume_min.is_finite() || !self.volume_max.is_finite() {
            return Err("volume bounds must be finite".to_string());
        }
        if self.volume_min > self.volume_max {
            return Err(format!(
                "volume_min ({}) must not exceed volume_max ({})",
                self.volume_min, self.volume_max
            ));
        }
        if !(self.volume_min..=self.volume_max).contains(&self.default_volume) {
            return Err(format!(
                "default_volume ({}) must lie within [{}, {}]",
                self.default_volume, self.volume_min, self.volume_max
            ));
        }
        if self.max_history == 0 {
            return Err("max_history must be >= 1".to_string());
        }
        if self.play_update_interval_ms == 0 {
            return Err("play_update_interval_ms must be >= 1".to_string());
        }
        if self.health_check_interval_secs == 0 {
            return Err("health_check_interval_secs must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.engine.timeout_secs == 0 {
            return Err("engine.timeout_secs must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn play_update_interval(&self) -> Duration {
        Duration::from_millis(self.play_update_interval_ms)
    }

    /// Idle cutoff, or `None` when idle disposal is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Clamps a requested volume into the configured range.
    pub fn clamp_volume(&self, volume: f32) -> f32 {
        volume.clamp(self.volume_min, self.volume_max)
    }
}
