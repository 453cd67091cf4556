//! Autoplay configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//!
//! ```
//! use autoplay_2048::config::AutoplayConfig;
//! let cfg = AutoplayConfig::from_yaml_str("tick_interval_ms: 200\n").unwrap();
//! assert_eq!(cfg.tick_interval_ms, 200);
//! assert_eq!(cfg.grid_size, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::policy::MAX_LOOKAHEAD;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoplayConfig {
    /// Grid edge length.
    pub grid_size: usize,
    /// Tiles spawned when a game starts.
    pub start_tiles: usize,
    /// Tile value that counts as a win.
    pub win_tile: u32,
    /// Keep playing after reaching `win_tile`.
    pub keep_playing: bool,
    /// Delay between ticks.
    pub tick_interval_ms: u64,
    /// Delay between a game ending and the next one starting.
    pub restart_delay_ms: u64,
    /// Start a new game automatically after each game ends.
    pub auto_restart: bool,
    /// Trial count at which the ledger re-rolls the active policy.
    pub rotate_after: u32,
    /// Upper bound for the lookahead of user-supplied policies.
    pub max_lookahead: u8,
    /// Storage key the outcome ledger is persisted under.
    pub storage_key: String,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self {
            grid_size: 4,
            start_tiles: 2,
            win_tile: 2048,
            keep_playing: true,
            tick_interval_ms: 400,
            restart_delay_ms: 1000,
            auto_restart: true,
            rotate_after: 10,
            max_lookahead: MAX_LOOKAHEAD,
            storage_key: "aibrain".to_string(),
        }
    }
}

impl AutoplayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a map.
        let cfg: AutoplayConfig = if text.trim().is_empty() { Self::default() } else { serde_yaml::from_str(text)? };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size < 2 {
            return Err(ConfigError::Invalid(format!("grid_size must be at least 2, got {}", self.grid_size)));
        }
        if self.start_tiles > self.grid_size * self.grid_size {
            return Err(ConfigError::Invalid(format!("start_tiles {} does not fit the grid", self.start_tiles)));
        }
        if self.max_lookahead > MAX_LOOKAHEAD {
            return Err(ConfigError::Invalid(format!(
                "max_lookahead must be at most {MAX_LOOKAHEAD}, got {}",
                self.max_lookahead
            )));
        }
        if self.rotate_after == 0 {
            return Err(ConfigError::Invalid("rotate_after must be at least 1".to_string()));
        }
        if self.storage_key.is_empty() {
            return Err(ConfigError::Invalid("storage_key must not be empty".to_string()));
        }
        Ok(())
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration { Duration::from_millis(self.tick_interval_ms) }

    #[inline]
    pub fn restart_delay(&self) -> Duration { Duration::from_millis(self.restart_delay_ms) }
}
