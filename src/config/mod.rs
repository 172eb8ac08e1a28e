use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub coordinator: CoordinatorConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate of the mixed output (both sources are resampled to it)
    pub sample_rate: u32,
    /// How much audio the encoder buffers before emitting one chunk
    pub flush_interval_ms: u64,
    /// Period of the worker's liveness signal while encoding
    pub heartbeat_interval_ms: u64,
    /// How often monitored audio is forwarded to local playback
    pub playback_interval_ms: u64,
    /// Lifetime of a capture handle between acquisition and initialization
    pub handle_ttl_secs: u64,
    /// Play the monitored source back locally while recording
    pub loopback_playback: bool,
    /// Target used when a start request does not name one
    pub default_target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Delay between a finished/failed session and the worker teardown
    pub teardown_grace_ms: u64,
    /// A live worker silent for longer than this is treated as hung
    pub staleness_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    pub append_attempts: u32,
    pub append_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub download_dir: Option<PathBuf>,
    pub filename_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            flush_interval_ms: 5000,
            heartbeat_interval_ms: 10_000,
            playback_interval_ms: 20,
            handle_ttl_secs: 30,
            loopback_playback: true,
            default_target: "monitor".to_string(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            teardown_grace_ms: 2000,
            staleness_threshold_ms: 30_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            append_attempts: 3,
            append_backoff_ms: 100,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            filename_prefix: "meeting-recording".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 3838 }
    }
}

impl CaptureConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_interval_ms)
    }

    pub fn handle_ttl(&self) -> Duration {
        Duration::from_secs(self.handle_ttl_secs)
    }
}

impl CoordinatorConfig {
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }
}

impl StorageConfig {
    pub fn append_backoff(&self) -> Duration {
        Duration::from_millis(self.append_backoff_ms)
    }

    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => global::db_file(),
        }
    }
}

impl OutputConfig {
    pub fn resolve_download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::download_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject settings that would break the lifecycle guarantees.
    pub fn validate(&self) -> Result<()> {
        if self.capture.flush_interval_ms == 0 {
            bail!("capture.flush_interval_ms must be greater than zero");
        }
        if self.capture.playback_interval_ms == 0
            || self.capture.playback_interval_ms >= self.capture.flush_interval_ms
        {
            bail!(
                "capture.playback_interval_ms ({}) must be non-zero and shorter than capture.flush_interval_ms ({})",
                self.capture.playback_interval_ms,
                self.capture.flush_interval_ms
            );
        }
        if self.capture.sample_rate == 0 {
            bail!("capture.sample_rate must be greater than zero");
        }
        if self.capture.heartbeat_interval_ms == 0
            || self.capture.heartbeat_interval_ms >= self.coordinator.staleness_threshold_ms
        {
            bail!(
                "capture.heartbeat_interval_ms ({}) must be non-zero and shorter than coordinator.staleness_threshold_ms ({})",
                self.capture.heartbeat_interval_ms,
                self.coordinator.staleness_threshold_ms
            );
        }
        if self.storage.append_attempts == 0 {
            bail!("storage.append_attempts must be at least 1");
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
