// src/config.rs
//
// Storage configuration
//
// PRINCIPLES:
// - Every path is derived from one root directory
// - Defaults are usable without a config file
// - Invalid values fail at load time, not mid-operation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

const APP_DIR_NAME: &str = "curtaincall";

/// Layout and tuning knobs for the persistence layer.
///
/// Path structure:
/// - `{root_dir}/{database_file}`
/// - `{root_dir}/Images/...` (media namespaces)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding the database and the image tree
    pub root_dir: PathBuf,

    /// Database file name, relative to `root_dir`
    pub database_file: String,

    /// Longer side of generated thumbnails, in pixels
    pub thumbnail_max_dimension: u32,

    /// JPEG quality used when normalizing remote images (1..=100)
    pub jpeg_quality: u8,

    /// Upper bound on concurrently running media operations per call
    pub max_parallel_media_ops: usize,

    /// Maximum pooled database connections
    pub pool_max_size: u32,

    /// Timeout for remote image downloads
    pub http_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR_NAME);

        Self::from_root(root_dir)
    }
}

impl StorageConfig {
    /// Default configuration rooted at an explicit directory
    pub fn from_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            database_file: format!("{}.db", APP_DIR_NAME),
            thumbnail_max_dimension: 300,
            jpeg_quality: 80,
            max_parallel_media_ops: 4,
            pool_max_size: 8,
            http_timeout_secs: 30,
        }
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: StorageConfig = serde_json::from_str(&raw)?;
        config.validate()?;

        log::debug!("Loaded storage config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_parallel_media_ops == 0 {
            return Err(AppError::Config(
                "max_parallel_media_ops must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.thumbnail_max_dimension == 0 {
            return Err(AppError::Config(
                "thumbnail_max_dimension must be positive".to_string(),
            ));
        }
        if self.pool_max_size == 0 {
            return Err(AppError::Config("pool_max_size must be positive".to_string()));
        }
        if self.database_file.trim().is_empty() {
            return Err(AppError::Config("database_file cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_dir.join(&self.database_file)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root_dir.join("Images")
    }
}
