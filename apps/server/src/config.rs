//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! The file maps directly onto [`ari_core::Config`]; missing keys take their
//! defaults.

use std::path::Path;

use anyhow::{Context, Result};
use ari_core::Config;

/// Loads configuration from a YAML file, then applies `ARI_*` environment
/// overrides. Validation happens when the services are bootstrapped.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config: Config = if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies environment variable overrides to the configuration.
///
/// Unparseable values are ignored with a warning.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(key: &str, val: String) -> Option<T> {
        let parsed = val.parse().ok();
        if parsed.is_none() {
            log::warn!("Ignoring invalid value for {}: {:?}", key, val);
        }
        parsed
    }

    macro_rules! override_parsed {
        ($key:literal, $field:expr) => {
            if let Some(v) = var($key).and_then(|val| parsed($key, val)) {
                $field = v;
            }
        };
    }

    override_parsed!("ARI_BIND_PORT", config.bind_port);
    override_parsed!("ARI_MAX_HISTORY", config.max_history);
    override_parsed!("ARI_MAX_QUEUE_LEN", config.max_queue_len);
    override_parsed!("ARI_IDLE_TIMEOUT_SECS", config.idle_timeout_secs);
    override_parsed!("ARI_PLAY_UPDATE_INTERVAL_MS", config.play_update_interval_ms);
    override_parsed!("ARI_STRICT_SEEK", config.strict_seek);

    if let Some(url) = var("ARI_ENGINE_URL") {
        config.engine.url = url;
    }
    if let Some(password) = var("ARI_ENGINE_PASSWORD") {
        config.engine.password = Some(password).filter(|p| !p.is_empty());
    }
    if let Some(origins) = var("ARI_TRUSTED_ORIGINS") {
        config.trusted_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
}
