//! Configuration management for Resonant
//!
//! This module provides:
//! - Configuration structs for the filter, streaming and audio output
//! - TOML serialization with async load/save
//! - A manager for the per-user config file with corrupt-file recovery

use crate::domain::cache::DEFAULT_BLOCK_LEN;
use crate::domain::filter::{params, AdjustmentSteps};
use crate::domain::streaming::StreamSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Filter defaults and adjustment step sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Cutoff applied on open and on every reload
    pub default_cutoff_hz: f64,

    /// Q applied on open and on every reload
    pub default_q: f64,

    /// Cutoff change per tick while a cutoff key is held
    pub cutoff_step_hz: f64,

    /// Q change per tick while a Q key is held
    pub q_step: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_cutoff_hz: params::DEFAULT_CUTOFF,
            default_q: params::DEFAULT_Q,
            cutoff_step_hz: params::CUTOFF_STEP,
            q_step: params::Q_STEP,
        }
    }
}

/// Block cache and control loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames per cache block
    pub block_len: usize,

    /// Control tick period in milliseconds
    pub tick_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_len: DEFAULT_BLOCK_LEN,
            tick_ms: 16,
        }
    }
}

/// Output device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOutputConfig {
    /// Device buffer size in frames
    pub buffer_size: u32,

    /// Output device name (empty = use default)
    pub output_device: String,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            output_device: String::new(),
        }
    }
}

/// Complete Resonant configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResonantConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub audio: AudioOutputConfig,
}

impl ResonantConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = self.to_toml()?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the streaming engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let filter = &self.filter;

        if self.stream.block_len == 0 {
            return Err(ConfigError::Invalid("stream.block_len must be positive".to_string()));
        }
        if self.stream.tick_ms == 0 {
            return Err(ConfigError::Invalid("stream.tick_ms must be positive".to_string()));
        }
        if !(filter.cutoff_step_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "filter.cutoff_step_hz must be positive, got {}",
                filter.cutoff_step_hz
            )));
        }
        if !(filter.q_step > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "filter.q_step must be positive, got {}",
                filter.q_step
            )));
        }
        if !(params::CUTOFF_MIN..=params::CUTOFF_MAX).contains(&filter.default_cutoff_hz) {
            return Err(ConfigError::Invalid(format!(
                "filter.default_cutoff_hz must be within {}..={} Hz, got {}",
                params::CUTOFF_MIN,
                params::CUTOFF_MAX,
                filter.default_cutoff_hz
            )));
        }
        if !(params::Q_MIN..=params::Q_MAX).contains(&filter.default_q) {
            return Err(ConfigError::Invalid(format!(
                "filter.default_q must be within {}..={}, got {}",
                params::Q_MIN,
                params::Q_MAX,
                filter.default_q
            )));
        }
        if self.audio.buffer_size == 0 {
            return Err(ConfigError::Invalid("audio.buffer_size must be positive".to_string()));
        }

        Ok(())
    }

    /// Settings for a streaming session
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            block_len: self.stream.block_len,
            default_cutoff_hz: self.filter.default_cutoff_hz,
            default_q: self.filter.default_q,
            steps: AdjustmentSteps {
                cutoff_hz: self.filter.cutoff_step_hz,
                q: self.filter.q_step,
            },
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.stream.tick_ms)
    }
}

/// Configuration file manager
///
/// Manages the main configuration file at `~/.config/resonant/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for `config_dir/config.toml`
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Manager for an explicit config file path
    pub fn with_path(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/resonant` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("resonant"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the defaults.
    /// If the config file is corrupt or invalid, backs it up and returns the
    /// defaults.
    #[instrument(skip(self))]
    pub async fn load(&self) -> ResonantConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating default"
            );

            let config = ResonantConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }

            return config;
        }

        match ResonantConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                ResonantConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &ResonantConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(
                path = %self.config_path.display(),
                "Configuration cleared"
            );
        }

        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = ResonantConfig::default();

        let toml_str = config.to_toml().unwrap();
        let parsed: ResonantConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
        assert!(toml_str.contains("[filter]"));
        assert!(toml_str.contains("block_len = 5000"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: ResonantConfig = toml::from_str("[stream]\nblock_len = 2048\n").unwrap();

        assert_eq!(parsed.stream.block_len, 2048);
        assert_eq!(parsed.stream.tick_ms, 16);
        assert_eq!(parsed.filter, FilterConfig::default());
        assert_eq!(parsed.audio.buffer_size, 512);
    }

    #[test]
    fn test_validate() {
        assert!(ResonantConfig::default().validate().is_ok());

        let mut config = ResonantConfig::default();
        config.stream.block_len = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ResonantConfig::default();
        config.stream.tick_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ResonantConfig::default();
        config.filter.q_step = -0.02;
        assert!(config.validate().is_err());

        let mut config = ResonantConfig::default();
        config.filter.cutoff_step_hz = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ResonantConfig::default();
        config.filter.default_cutoff_hz = 12000.0;
        assert!(config.validate().is_err());

        let mut config = ResonantConfig::default();
        config.filter.default_q = 0.05;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_settings() {
        let mut config = ResonantConfig::default();
        config.filter.default_cutoff_hz = 800.0;
        config.filter.q_step = 0.5;
        config.stream.block_len = 1024;

        let settings = config.stream_settings();
        assert_eq!(settings.block_len, 1024);
        assert_eq!(settings.default_cutoff_hz, 800.0);
        assert_eq!(settings.steps.q, 0.5);
        assert_eq!(settings.steps.cutoff_hz, params::CUTOFF_STEP);
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = ResonantConfig::default();
        config.filter.default_q = 2.5;
        config.save_to_file(&config_path).await.unwrap();

        assert!(config_path.exists());

        let loaded = ResonantConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    // ------------------------------------------------------------------------
    // ConfigManager
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_manager_writes_default_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        assert!(!manager.exists());

        let config = manager.load().await;
        assert_eq!(config, ResonantConfig::default());
        assert!(manager.exists());
    }

    #[tokio::test]
    async fn test_manager_backs_up_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        tokio::fs::write(manager.config_path(), "[filter\nnot toml")
            .await
            .unwrap();

        let config = manager.load().await;
        assert_eq!(config, ResonantConfig::default());
        assert!(temp_dir.path().join("config.toml.corrupt").exists());
    }

    #[tokio::test]
    async fn test_manager_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        tokio::fs::write(manager.config_path(), "[stream]\nblock_len = 0\n")
            .await
            .unwrap();

        let config = manager.load().await;
        assert_eq!(config.stream.block_len, DEFAULT_BLOCK_LEN);

        let mut bad = ResonantConfig::default();
        bad.stream.tick_ms = 0;
        assert!(manager.save(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_manager_save_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("custom.toml"));

        let mut config = ResonantConfig::default();
        config.audio.buffer_size = 256;
        manager.save(&config).await.unwrap();
        assert_eq!(manager.load().await, config);

        manager.clear().await.unwrap();
        assert!(!manager.exists());
    }
}
