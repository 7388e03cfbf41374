//! Configuration
//!
//! Cache location and budget plus the default retry policy. Every field has
//! a default, so a config file only needs the values it changes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::request::RetryPolicy;

/// Default maximum disk usage: 5 MB
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 5 * 1024 * 1024;

/// Fraction of the budget the cache is pruned down to
pub const DEFAULT_HYSTERESIS: f64 = 0.9;

/// Number of threads parsing record headers at startup
pub const DEFAULT_LOADER_THREADS: usize = 2;

/// Disk cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one file per cached record
    pub root_dir: PathBuf,
    /// Size budget in bytes
    pub max_size_bytes: u64,
    /// Pruning target as a fraction of `max_size_bytes`
    pub hysteresis: f64,
    /// Background header parsers used during the startup scan
    pub loader_threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("reqcache");

        Self {
            root_dir,
            max_size_bytes: DEFAULT_MAX_CACHE_SIZE,
            hysteresis: DEFAULT_HYSTERESIS,
            loader_threads: DEFAULT_LOADER_THREADS,
        }
    }
}

impl CacheConfig {
    /// Cache rooted at `root_dir` with the default budget
    pub fn with_dir(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Reject values the store cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.hysteresis > 0.0 && self.hysteresis <= 1.0) {
            bail!("hysteresis must be in (0, 1], got {}", self.hysteresis);
        }
        if self.loader_threads == 0 {
            bail!("loader_threads must be at least 1");
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(content).context("Failed to parse configuration JSON")?;
        config.cache.validate()?;
        Ok(config)
    }
}
