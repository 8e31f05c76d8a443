//! # Engine Configuration
//!
//! Configuration for the sync engines, retry policy and alert scans.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RANCH_CACHE_TTL_SECS=120                                           │
//! │     RANCH_RETRY_MAX_ATTEMPTS=10                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/sync/sync.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.ranch.sync/sync.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     5 min TTL, 30 s replay, unlimited retries, no backoff              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [engine]
//! cache_ttl_secs = 300
//! replay_interval_secs = 30
//! event_capacity = 64
//!
//! [retry]
//! max_attempts = 0      # 0 = retry forever
//! failing_threshold = 3
//! backoff = false
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//!
//! [alerts]
//! scan_interval_secs = 300
//! channel_capacity = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::EngineSettings;
use crate::error::{SyncError, SyncResult};
use crate::queue::{BackoffPolicy, RetryPolicy};

// =============================================================================
// Engine Section
// =============================================================================

/// Cache and replay timing shared by every domain engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    /// How long a cached read stays valid (seconds).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Period of the replay safety-net timer (seconds).
    #[serde(default = "default_replay_interval")]
    pub replay_interval_secs: u64,

    /// Capacity of each engine's sync event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_replay_interval() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    64
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            cache_ttl_secs: default_cache_ttl(),
            replay_interval_secs: default_replay_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

// =============================================================================
// Retry Section
// =============================================================================

/// What happens to a queued operation the server keeps rejecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    /// Failed attempts before an operation is dead-lettered.
    /// Set to 0 for infinite retries.
    #[serde(default)]
    pub max_attempts: u32,

    /// Failed attempts after which an operation counts as failing in
    /// queue health.
    #[serde(default = "default_failing_threshold")]
    pub failing_threshold: u32,

    /// Space out attempts on a rejected operation.
    #[serde(default)]
    pub backoff: bool,

    /// Initial backoff duration (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_failing_threshold() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for RetrySection {
    fn default() -> Self {
        RetrySection {
            max_attempts: 0,
            failing_threshold: default_failing_threshold(),
            backoff: false,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Alerts Section
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsSection {
    /// Period of each facade's rule scan (seconds).
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Capacity of the alert event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_scan_interval() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for AlertsSection {
    fn default() -> Self {
        AlertsSection {
            scan_interval_secs: default_scan_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub alerts: AlertsSection,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.engine.cache_ttl_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "cache_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.engine.replay_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "replay_interval_secs must be greater than 0".into(),
            ));
        }
        if self.alerts.scan_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "scan_interval_secs must be greater than 0".into(),
            ));
        }
        if self.engine.event_capacity == 0 || self.alerts.channel_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "channel capacities must be greater than 0".into(),
            ));
        }
        if self.retry.backoff {
            if self.retry.initial_backoff_ms == 0 {
                return Err(SyncError::InvalidConfig(
                    "initial_backoff_ms must be greater than 0".into(),
                ));
            }
            if Duration::from_millis(self.retry.initial_backoff_ms)
                > Duration::from_secs(self.retry.max_backoff_secs)
            {
                return Err(SyncError::InvalidConfig(format!(
                    "initial backoff {}ms exceeds max backoff {}s",
                    self.retry.initial_backoff_ms, self.retry.max_backoff_secs
                )));
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides from a variable lookup. Unparseable values are
    /// logged and ignored.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = parse_var::<u64>(&lookup, "RANCH_CACHE_TTL_SECS") {
            debug!(secs, "Overriding cache TTL from environment");
            self.engine.cache_ttl_secs = secs;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "RANCH_REPLAY_INTERVAL_SECS") {
            debug!(secs, "Overriding replay interval from environment");
            self.engine.replay_interval_secs = secs;
        }

        if let Some(attempts) = parse_var::<u32>(&lookup, "RANCH_RETRY_MAX_ATTEMPTS") {
            debug!(attempts, "Overriding max attempts from environment");
            self.retry.max_attempts = attempts;
        }

        if let Some(value) = lookup("RANCH_RETRY_BACKOFF") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.retry.backoff = true,
                "0" | "false" | "off" | "no" => self.retry.backoff = false,
                _ => warn!(value = %value, "Unknown backoff flag in environment"),
            }
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "RANCH_SCAN_INTERVAL_SECS") {
            debug!(secs, "Overriding scan interval from environment");
            self.alerts.scan_interval_secs = secs;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ranch", "sync")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = self.retry.backoff.then(|| BackoffPolicy {
            initial: Duration::from_millis(self.retry.initial_backoff_ms),
            max: Duration::from_secs(self.retry.max_backoff_secs),
            ..BackoffPolicy::default()
        });
        RetryPolicy {
            max_attempts: (self.retry.max_attempts > 0).then_some(self.retry.max_attempts),
            failing_threshold: self.retry.failing_threshold,
            backoff,
        }
    }

    /// Settings for one domain engine.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            cache_ttl: chrono::Duration::seconds(
                i64::try_from(self.engine.cache_ttl_secs).unwrap_or(i64::MAX / 1_000),
            ),
            replay_interval: Duration::from_secs(self.engine.replay_interval_secs),
            retry: self.retry_policy(),
            event_capacity: self.engine.event_capacity,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.alerts.scan_interval_secs)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
