//! Configuration file parser for ~/.config/wikiscroll/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged as warnings.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::FeedSettings;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content provider origin, e.g. `https://en.wikipedia.org`.
    pub base_url: String,

    /// Target depth of the prefetch queue.
    pub buffer_size: usize,

    /// Entries a viewport window keeps materialized in steady state.
    pub max_visible: usize,

    /// Neighbours kept on each side of the visible run during eviction.
    pub recycle_buffer_count: usize,

    /// Scroll inactivity required before a debounced eviction pass.
    pub scroll_debounce_ms: u64,

    /// Delay between sequential personalized fetches.
    pub pacing_ms: u64,

    /// Fresh items fetched per personalized batch.
    pub for_you_fetch_count: usize,

    /// Tiles shown on the first personalized load.
    pub for_you_initial_batch: usize,

    /// Tiles appended by "load more".
    pub for_you_more_batch: usize,

    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://en.wikipedia.org".to_string(),
            buffer_size: 10,
            max_visible: 5,
            recycle_buffer_count: 1,
            scroll_debounce_ms: 100,
            pacing_ms: 300,
            for_you_fetch_count: 10,
            for_you_initial_batch: 10,
            for_you_more_batch: 5,
            request_timeout_secs: 20,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "base_url",
        "buffer_size",
        "max_visible",
        "recycle_buffer_count",
        "scroll_debounce_ms",
        "pacing_ms",
        "for_you_fetch_count",
        "for_you_initial_batch",
        "for_you_more_batch",
        "request_timeout_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Values that break window/buffer invariants → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), base_url = %config.base_url, "Loaded configuration");
        Ok(config)
    }

    /// Reject values the feed engine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be at least 1".into()));
        }
        let working_set = 2 * self.recycle_buffer_count + 1;
        if self.max_visible < working_set {
            return Err(ConfigError::Invalid(format!(
                "max_visible ({}) must be at least 2 * recycle_buffer_count + 1 ({})",
                self.max_visible, working_set
            )));
        }
        if self.for_you_initial_batch == 0 || self.for_you_more_batch == 0 {
            return Err(ConfigError::Invalid(
                "personalized batch sizes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Runtime knobs for [`crate::feed::Feed`].
    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            buffer_size: self.buffer_size,
            max_visible: self.max_visible,
            recycle_buffer_count: self.recycle_buffer_count,
            scroll_debounce: Duration::from_millis(self.scroll_debounce_ms),
            pacing: Duration::from_millis(self.pacing_ms),
            for_you_fetch_count: self.for_you_fetch_count,
            for_you_initial_batch: self.for_you_initial_batch,
            for_you_more_batch: self.for_you_more_batch,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
