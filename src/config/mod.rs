//! Configuration management for mai-streaming
//!
//! Settings come from an optional TOML file; CLI flags and environment
//! variables are applied on top by the binary.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::locate::FileFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Batching, concurrency and scan behaviour
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// External traffic classifier
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Search store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Elasticsearch base URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Target index (collection) name
    #[serde(default = "default_store_index")]
    pub index: String,

    /// Maximum documents per `_bulk` request
    #[serde(default = "default_store_chunk_size")]
    pub chunk_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Environment variable name holding an API key
    #[serde(default = "default_store_api_key_env")]
    pub api_key_env: String,

    /// Attach deterministic `_id`s so re-ingested files overwrite instead of duplicating
    #[serde(default = "default_stable_ids")]
    pub stable_ids: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rows per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Files processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay between live scans in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum file age before a live scan picks it up
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Completion marker suffix
    #[serde(default = "default_marker_suffix")]
    pub marker_suffix: String,
}

/// Traffic classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Classifier executable
    #[serde(default = "default_capture_binary")]
    pub binary: String,

    #[serde(default = "default_max_flow_packets")]
    pub max_flow_packets: u32,

    #[serde(default = "default_min_flow_packets")]
    pub min_flow_packets: u32,

    /// Flow export period in live mode (seconds)
    #[serde(default = "default_export_duration")]
    pub export_duration_secs: u32,

    /// Where extracted files go when no output directory is given
    #[serde(default = "default_output_dir")]
    pub default_output_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            index: default_store_index(),
            chunk_size: default_store_chunk_size(),
            timeout_secs: default_store_timeout(),
            api_key_env: default_store_api_key_env(),
            stable_ids: default_stable_ids(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_secs: default_settle_secs(),
            marker_suffix: default_marker_suffix(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            binary: default_capture_binary(),
            max_flow_packets: default_max_flow_packets(),
            min_flow_packets: default_min_flow_packets(),
            export_duration_secs: default_export_duration(),
            default_output_dir: default_output_dir(),
        }
    }
}

impl StoreConfig {
    /// Get the store API key from environment
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env).ok()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional path, falling back to defaults
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load(path),
            None => {
                debug!("No config file given, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Output directory used when the CLI does not name one
    pub fn default_output_dir(&self) -> PathBuf {
        PathBuf::from(&self.capture.default_output_dir)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.store.url)
            .map_err(|e| Error::Config(format!("store.url '{}' is invalid: {}", self.store.url, e)))?;

        if self.store.index.trim().is_empty() {
            return Err(Error::Config("store.index must not be empty".to_string()));
        }

        if self.store.chunk_size == 0 {
            return Err(Error::Config("store.chunk_size must be positive".to_string()));
        }

        if self.pipeline.batch_size == 0 {
            return Err(Error::Config(
                "pipeline.batch_size must be positive".to_string(),
            ));
        }

        if self.pipeline.workers == 0 {
            return Err(Error::Config("pipeline.workers must be positive".to_string()));
        }

        if !self.pipeline.marker_suffix.starts_with('.') || self.pipeline.marker_suffix.len() < 2 {
            return Err(Error::Config(
                "pipeline.marker_suffix must look like '.name'".to_string(),
            ));
        }

        // Markers named like inputs would be picked up as files to ingest
        let marker = PathBuf::from(format!("marker{}", self.pipeline.marker_suffix));
        if let Some(format) = FileFormat::from_path(&marker) {
            return Err(Error::Config(format!(
                "pipeline.marker_suffix must not end in '.{}'",
                format
            )));
        }

        Ok(())
    }
}
