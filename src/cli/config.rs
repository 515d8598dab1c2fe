//! Configuration file handling for the grindcard CLI
//!
//! Manages configuration stored in `~/.config/grindcard/config.toml` (or platform equivalent).
//!
//! ## Configuration Layers
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Hard-coded defaults
//! 2. Config file (`~/.config/grindcard/config.toml`)
//! 3. Environment variables (`GRINDCARD_*`)
//! 4. Command-line arguments
//!
//! ## Example Config File
//!
//! ```toml
//! version = 1
//!
//! [engine]
//! trial_days = 7
//! tick_interval_ms = 1000
//! publish_interval_seconds = 5
//! max_tick_gap_seconds = 30
//!
//! [output]
//! default_format = "human"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::EngineConfig;

// =============================================================================
// Configuration Structures
// =============================================================================

// Config file format version
// Bump this when making breaking changes to the config structure
const CONFIG_VERSION: u32 = 1;

const ENV_PREFIX: &str = "GRINDCARD_";

/// Root configuration for the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config file format version
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Trial and refresh settings
    #[serde(default)]
    pub engine: EngineSection,

    /// Output format settings
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

/// Trial window and refresh cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Trial length in days
    #[serde(default = "default_trial_days")]
    pub trial_days: u64,

    /// Clock check interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Minimum seconds between routine snapshot republishes
    #[serde(default = "default_publish_interval_seconds")]
    pub publish_interval_seconds: u64,

    /// Tick-to-tick jump (seconds) treated as a clock gap
    #[serde(default = "default_max_tick_gap_seconds")]
    pub max_tick_gap_seconds: u64,
}

/// Output format configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format (human, json)
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Include the capability list in human output
    #[serde(default = "default_true")]
    pub show_capabilities: bool,
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_trial_days() -> u64 {
    7
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_publish_interval_seconds() -> u64 {
    5
}

fn default_max_tick_gap_seconds() -> u64 {
    30
}

fn default_format() -> String {
    "human".to_string()
}

fn default_true() -> bool {
    true
}

fn normalize_format(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "json" | "js" => "json".to_string(),
        _ => "human".to_string(),
    }
}

// =============================================================================
// Default Implementations
// =============================================================================

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            engine: EngineSection::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
            tick_interval_ms: default_tick_interval_ms(),
            publish_interval_seconds: default_publish_interval_seconds(),
            max_tick_gap_seconds: default_max_tick_gap_seconds(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            show_capabilities: true,
        }
    }
}

// =============================================================================
// Conversion
// =============================================================================

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            trial_window: Duration::from_secs(self.trial_days.saturating_mul(24 * 60 * 60)),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            publish_interval: Duration::from_secs(self.publish_interval_seconds),
            max_tick_gap: Duration::from_secs(self.max_tick_gap_seconds),
        }
    }
}

// =============================================================================
// Configuration Loading and Saving
// =============================================================================

impl AppConfig {
    /// Get the default configuration file path
    ///
    /// Returns platform-specific config directory:
    /// - Linux: `~/.config/grindcard/config.toml`
    /// - macOS: `~/Library/Application Support/grindcard/config.toml`
    /// - Windows: `%APPDATA%\grindcard\config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("grindcard")
            .join("config.toml")
    }

    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Self {
        Self::load_from(Self::default_path()).with_env_overrides()
    }

    /// Load configuration from a specific path
    ///
    /// Returns default configuration if the file doesn't exist or can't be parsed.
    /// A non-canonical output format is normalized and written back.
    pub fn load_from(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<Self>(&content) {
                Ok(mut config) => {
                    tracing::debug!("Loaded config from {:?}", path);

                    config.check_version();

                    let normalized = normalize_format(&config.output.default_format);
                    if normalized != config.output.default_format {
                        tracing::info!(
                            "Normalizing output.default_format {:?} -> {:?}",
                            config.output.default_format,
                            normalized
                        );
                        config.output.default_format = normalized;
                        if let Err(e) = config.save_to(path.clone()) {
                            tracing::warn!("Failed to persist normalized config {:?}: {}", path, e);
                        }
                    }
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("Config file not found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    fn check_version(&self) {
        if self.version > CONFIG_VERSION {
            tracing::warn!(
                "Config version {} is newer than supported version {}. Some settings may be ignored.",
                self.version,
                CONFIG_VERSION
            );
        }
    }

    /// Apply `GRINDCARD_*` environment overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(std::env::vars())
    }

    /// Apply overrides such as `GRINDCARD_ENGINE_TRIAL_DAYS=14`
    ///
    /// Unknown keys and unparsable values are logged and skipped.
    pub fn with_overrides_from<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = match rest.to_lowercase().split_once('_') {
                Some((section, field)) => format!("{}.{}", section, field),
                None => continue,
            };
            match self.set(&key, &value) {
                Ok(()) => tracing::debug!("Applied {} from environment", key),
                Err(e) => tracing::warn!("Ignoring {}: {}", name, e),
            }
        }
        self
    }

    /// Save configuration to the default path
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&path, content)?;
        tracing::debug!("Saved config to {:?}", path);

        Ok(())
    }

    /// Get a configuration value by key path
    ///
    /// Key path uses dot notation: `engine.trial_days`
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["engine", "trial_days"] => Some(self.engine.trial_days.to_string()),
            ["engine", "tick_interval_ms"] => Some(self.engine.tick_interval_ms.to_string()),
            ["engine", "publish_interval_seconds"] => {
                Some(self.engine.publish_interval_seconds.to_string())
            }
            ["engine", "max_tick_gap_seconds"] => {
                Some(self.engine.max_tick_gap_seconds.to_string())
            }
            ["output", "default_format"] => Some(self.output.default_format.clone()),
            ["output", "show_capabilities"] => Some(self.output.show_capabilities.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path
    ///
    /// Key path uses dot notation: `engine.trial_days`
    /// Returns an error if the key is invalid or the value can't be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["engine", "trial_days"] => {
                self.engine.trial_days = parse_positive(key, value)?;
            }
            ["engine", "tick_interval_ms"] => {
                self.engine.tick_interval_ms = parse_positive(key, value)?;
            }
            ["engine", "publish_interval_seconds"] => {
                self.engine.publish_interval_seconds = parse_positive(key, value)?;
            }
            ["engine", "max_tick_gap_seconds"] => {
                self.engine.max_tick_gap_seconds = parse_positive(key, value)?;
            }
            ["output", "default_format"] => {
                if !["human", "json"].contains(&value) {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "human or json".to_string(),
                    });
                }
                self.output.default_format = value.to_string();
            }
            ["output", "show_capabilities"] => {
                self.output.show_capabilities =
                    value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "true or false".to_string(),
                    })?;
            }
            _ => {
                return Err(ConfigError::UnknownKey(key.to_string()));
            }
        }
        Ok(())
    }

    /// List all configuration keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "engine.trial_days",
            "engine.tick_interval_ms",
            "engine.publish_interval_seconds",
            "engine.max_tick_gap_seconds",
            "output.default_format",
            "output.show_capabilities",
        ]
        .into_iter()
        .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
        .collect()
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "positive integer".to_string(),
        }),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Tests
// =============================================================================
