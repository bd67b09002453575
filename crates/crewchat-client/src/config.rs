//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use crewchat_shared::constants::{DEFAULT_JPEG_QUALITY, REPLY_DELAY_MAX_MS, REPLY_DELAY_MIN_MS};
use crewchat_store::SeedSource;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding chats, messages, seed status and images.
    /// Env: `CREWCHAT_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// JSON file to seed the default chat from instead of the bundled set.
    /// Env: `CREWCHAT_SEED_PATH`
    pub seed_path: Option<PathBuf>,

    /// Bounds of the simulated agent reply delay.
    /// Env: `CREWCHAT_REPLY_DELAY_MIN_MS`, `CREWCHAT_REPLY_DELAY_MAX_MS`
    /// Default: 1000 / 2500 ms.
    pub reply_delay_min: Duration,
    pub reply_delay_max: Duration,

    /// JPEG quality for saved images (1-100).
    /// Env: `CREWCHAT_JPEG_QUALITY`
    /// Default: `80`
    pub jpeg_quality: u8,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            seed_path: None,
            reply_delay_min: Duration::from_millis(REPLY_DELAY_MIN_MS),
            reply_delay_max: Duration::from_millis(REPLY_DELAY_MAX_MS),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("CREWCHAT_DATA_DIR").filter(|s| !s.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(path) = lookup("CREWCHAT_SEED_PATH").filter(|s| !s.trim().is_empty()) {
            config.seed_path = Some(PathBuf::from(path));
        }

        let min = parse_millis(&lookup, "CREWCHAT_REPLY_DELAY_MIN_MS");
        let max = parse_millis(&lookup, "CREWCHAT_REPLY_DELAY_MAX_MS");
        let min = min.unwrap_or(config.reply_delay_min);
        let max = max.unwrap_or(config.reply_delay_max);
        if min <= max {
            config.reply_delay_min = min;
            config.reply_delay_max = max;
        } else {
            tracing::warn!(
                min_ms = min.as_millis() as u64,
                max_ms = max.as_millis() as u64,
                "Reply delay minimum exceeds maximum, using defaults"
            );
        }

        if let Some(val) = lookup("CREWCHAT_JPEG_QUALITY") {
            match val.trim().parse::<u8>() {
                Ok(q) if (1..=100).contains(&q) => config.jpeg_quality = q,
                _ => {
                    tracing::warn!(value = %val, "Invalid CREWCHAT_JPEG_QUALITY, using default");
                }
            }
        }

        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_reply_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reply_delay_min = min.min(max);
        self.reply_delay_max = max.max(min);
        self
    }

    pub fn seed_source(&self) -> SeedSource {
        match &self.seed_path {
            Some(path) => SeedSource::File(path.clone()),
            None => SeedSource::Bundled,
        }
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let val = lookup(key)?;
    match val.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            tracing::warn!(key, value = %val, error = %e, "Invalid delay, using default");
            None
        }
    }
}
