use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::utils::limits::{DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "gridstore.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_directory: PathBuf,
    pub bucket_name: String,
    pub chunk_size_bytes: u32,
    pub auto_create_directories: bool,
    /// Upper bound for a single read into memory; 0 disables the check
    pub max_read_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            auto_create_directories: true,
            max_read_bytes: 0,
        }
    }
}

impl StoreConfig {
    /// Load `config_path` (or the default file), writing defaults if it is missing.
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if Path::new(config_file).exists() {
            Self::load(config_file)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            tracing::info!("Wrote default config to {}", config_file);
            Ok(config)
        }
    }

    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(config_path.as_ref())?;
        let config: StoreConfig = toml::from_str(&content)
            .map_err(|e| StoreError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_name.is_empty() {
            return Err(StoreError::Configuration("bucket_name must not be empty".into()));
        }
        if self.chunk_size_bytes == 0 || self.chunk_size_bytes > MAX_CHUNK_SIZE {
            return Err(StoreError::Configuration(format!(
                "chunk_size_bytes must be between 1 and {}",
                MAX_CHUNK_SIZE
            )));
        }
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if self.auto_create_directories && !self.data_directory.exists() {
            std::fs::create_dir_all(&self.data_directory)?;
            tracing::info!("Created data directory: {:?}", self.data_directory);
        }
        Ok(())
    }
}
