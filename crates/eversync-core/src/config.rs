//! Configuration module for Eversync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation and defaults. Library embedders usually
//! construct [`SyncOptions`] directly instead of going through a file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for Eversync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncOptions,
    pub logging: LoggingConfig,
}

/// Synchronization engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Whether to fetch 300px PNG thumbnails for downloaded notes.
    pub download_note_thumbnails: bool,
    /// Directory ink note rasters are saved into; `None` disables them.
    pub ink_note_images_storage_dir: Option<PathBuf>,
    /// Maximum entities per sync chunk request.
    pub max_entries_per_chunk: i32,
    /// Root directory for the on-disk sync chunk cache.
    pub sync_chunks_storage_dir: PathBuf,
    /// Root directory for the durable per-item journals and the sync state.
    pub sync_persistent_storage_dir: PathBuf,
}

impl Default for SyncOptions {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eversync");
        Self {
            download_note_thumbnails: false,
            ink_note_images_storage_dir: None,
            max_entries_per_chunk: 50,
            sync_chunks_storage_dir: data_dir.join("sync_chunks"),
            sync_persistent_storage_dir: data_dir,
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Default config file location: `<config_dir>/eversync/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eversync").join("config.yaml"))
    }

    /// Serialize to YAML and write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.sync.max_entries_per_chunk <= 0 {
            anyhow::bail!(
                "sync.max_entries_per_chunk must be positive, got {}",
                self.sync.max_entries_per_chunk
            );
        }
        Ok(())
    }
}
