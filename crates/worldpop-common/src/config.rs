//! Environment configuration for the local cache and download concurrency.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{WorldPopError, WorldPopResult};

/// Environment variable overriding the cache root directory.
pub const CACHE_DIR_ENV: &str = "WORLDPOP_CACHE_DIR";

/// Environment variable overriding the maximum number of parallel downloads.
pub const MAX_CONCURRENCY_ENV: &str = "WORLDPOP_MAX_CONCURRENCY";

/// Name of the manifest sub-directory under the cache root.
const MANIFEST_DIR_NAME: &str = "manifest";

/// Configuration shared by the manifest store and the download engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldPopConfig {
    /// Root directory holding cached rasters and the manifest table.
    pub cache_dir: PathBuf,

    /// Maximum number of concurrent downloads.
    pub max_concurrency: usize,
}

impl Default for WorldPopConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl WorldPopConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> WorldPopResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> WorldPopResult<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            config.cache_dir = PathBuf::from(dir.trim());
        }

        if let Some(val) = lookup(MAX_CONCURRENCY_ENV) {
            config.max_concurrency = parse_concurrency(&val)?;
        }

        Ok(config)
    }

    /// Use a different cache root.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Directory holding the cleaned manifest table and its hash.
    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_dir.join(MANIFEST_DIR_NAME)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn parse_concurrency(val: &str) -> WorldPopResult<usize> {
    match val.trim().parse::<usize>() {
        Ok(0) => Err(WorldPopError::Config(format!(
            "{MAX_CONCURRENCY_ENV} must be at least 1"
        ))),
        Ok(n) => Ok(n),
        Err(_) => Err(WorldPopError::Config(format!(
            "{MAX_CONCURRENCY_ENV} must be a positive integer, got '{val}'"
        ))),
    }
}

/// `<user cache dir>/worldpop`, falling back to `~/.cache/worldpop`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("worldpop")
}

/// One fewer than the number of CPUs, never below one.
pub fn default_max_concurrency() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
