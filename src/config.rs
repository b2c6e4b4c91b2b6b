//! Runtime configuration for fans-list.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Pagination limits, cache lifetime, populator sizing and per-store timeouts
//! all live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "fans-list", about = "Cache-aside fans list service")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address. Overrides `server.listen` from the config file.
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Page sizing and cache warm bound.
    pub pagination: PaginationConfig,

    /// Range cache settings.
    pub cache: CacheConfig,

    /// Background cache population.
    pub populator: PopulatorConfig,

    /// Per-collaborator call budgets.
    pub timeouts: TimeoutConfig,

    /// Fixture used to seed the in-memory stores.
    pub seed: Option<PathBuf>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when the request leaves it unset.
    pub default_page_size: usize,

    /// Upper bound applied to requested page sizes.
    pub max_page_size: usize,

    /// Maximum number of relations fetched from the relation store to seed
    /// the cache on a miss.
    pub max_warm_count: usize,

    /// Report `is_end = true` when the relation store has no fans at all.
    pub empty_source_is_end: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 200,
            max_warm_count: 5000,
            empty_source_is_end: false,
        }
    }
}

/// Which range cache implementation backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

/// Range cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,

    /// Key namespace; the target user id is appended after a `:`.
    pub key_prefix: String,

    /// Sliding expiry window in seconds.
    pub ttl_secs: u64,

    /// Connection URL, only read by the redis backend.
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            key_prefix: "biz#user#fans".to_string(),
            ttl_secs: 3600 * 24 * 2,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Background population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulatorConfig {
    /// Number of worker tasks draining the queue.
    pub workers: usize,

    /// Jobs beyond this many queued are dropped.
    pub queue_capacity: usize,
}

impl Default for PopulatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Timeouts for each collaborator, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub cache_ms: u64,
    pub relation_store_ms: u64,
    pub count_store_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            cache_ms: 200,
            relation_store_ms: 2000,
            count_store_ms: 500,
        }
    }
}

impl TimeoutConfig {
    pub fn cache(&self) -> Duration {
        Duration::from_millis(self.cache_ms)
    }

    pub fn relation_store(&self) -> Duration {
        Duration::from_millis(self.relation_store_ms)
    }

    pub fn count_store(&self) -> Duration {
        Duration::from_millis(self.count_store_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.pagination;
        anyhow::ensure!(p.default_page_size > 0, "pagination.default_page_size must be positive");
        anyhow::ensure!(
            p.default_page_size <= p.max_page_size,
            "pagination.default_page_size exceeds pagination.max_page_size"
        );
        anyhow::ensure!(p.max_warm_count > 0, "pagination.max_warm_count must be positive");
        anyhow::ensure!(self.populator.workers > 0, "populator.workers must be positive");
        anyhow::ensure!(
            self.populator.queue_capacity > 0,
            "populator.queue_capacity must be positive"
        );
        Ok(())
    }
}
