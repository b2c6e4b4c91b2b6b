//! Service wiring: builds collaborators, the populator and the engine from config.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::cache::memory::MemoryRangeCache;
use crate::cache::RangeCache;
use crate::config::{CacheBackendKind, Config};
use crate::metrics::Metrics;
use crate::pagination::{Collaborators, PaginationEngine};
use crate::populator::{AsyncPopulator, PopulatorSettings};
use crate::server::api::AppState;
use crate::store::memory::{Fixture, MemoryCountStore, MemoryRelationStore};

/// How often the in-memory cache drops expired collections.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build application state with the stores and cache named in `config`.
pub fn build_state(config: Arc<Config>) -> anyhow::Result<Arc<AppState>> {
    let (relations, counts) = match &config.seed {
        Some(path) => Fixture::load(path)?.into_stores(),
        None => (MemoryRelationStore::new(), MemoryCountStore::new()),
    };

    let cache: Arc<dyn RangeCache> = match config.cache.backend {
        CacheBackendKind::Memory => {
            let cache = Arc::new(MemoryRangeCache::new());
            spawn_sweeper(cache.clone());
            cache as Arc<dyn RangeCache>
        }
        CacheBackendKind::Redis => redis_cache(&config)?,
    };

    let deps = Collaborators {
        relations: Arc::new(relations),
        counts: Arc::new(counts),
        cache,
    };
    build_state_with(config, deps)
}

/// Build application state around caller-supplied collaborators.
pub fn build_state_with(config: Arc<Config>, deps: Collaborators) -> anyhow::Result<Arc<AppState>> {
    let metrics = Metrics::new()?;
    let populator = Arc::new(AsyncPopulator::start(
        deps.cache.clone(),
        PopulatorSettings {
            workers: config.populator.workers,
            queue_capacity: config.populator.queue_capacity,
            ttl: config.cache.ttl(),
            call_timeout: config.timeouts.cache(),
        },
        metrics.clone(),
    ));
    info!(
        workers = config.populator.workers,
        queue_capacity = config.populator.queue_capacity,
        "Cache populator started"
    );

    let engine = PaginationEngine::new(config.clone(), deps, populator, metrics.clone());
    Ok(Arc::new(AppState {
        engine,
        config,
        metrics,
        start_time: Instant::now(),
    }))
}

fn spawn_sweeper(cache: Arc<MemoryRangeCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            cache.sweep_expired().await;
        }
    });
}

#[cfg(feature = "redis")]
fn redis_cache(config: &Config) -> anyhow::Result<Arc<dyn RangeCache>> {
    let cache = crate::cache::redis::RedisRangeCache::connect(&config.cache.redis_url)?;
    info!(url = %config.cache.redis_url, "Using redis range cache");
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis"))]
fn redis_cache(_config: &Config) -> anyhow::Result<Arc<dyn RangeCache>> {
    anyhow::bail!("cache.backend = \"redis\" requires building with the `redis` feature")
}
