//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use fans_list::cache::memory::MemoryRangeCache;
use fans_list::cache::RangeCache;
use fans_list::config::Config;
use fans_list::error::{CacheError, StoreError};
use fans_list::metrics::Metrics;
use fans_list::model::{FollowCount, FollowRelation, ScoredMember, UserId};
use fans_list::pagination::{Collaborators, PaginationEngine};
use fans_list::populator::{AsyncPopulator, PopulatorSettings};
use fans_list::store::memory::{MemoryCountStore, MemoryRelationStore};
use fans_list::store::{CountStore, RelationStore};

pub fn config(max_warm_count: usize) -> Config {
    let mut cfg = Config::default();
    cfg.pagination.max_warm_count = max_warm_count;
    cfg.timeouts.cache_ms = 100;
    cfg.timeouts.relation_store_ms = 100;
    cfg.timeouts.count_store_ms = 100;
    cfg
}

pub fn rel(target: UserId, fan: UserId, created_at: i64) -> FollowRelation {
    FollowRelation {
        follower_id: fan,
        followed_user_id: target,
        created_at,
    }
}

/// Build an engine over the given collaborators with its own populator.
pub fn engine(cfg: Config, deps: Collaborators) -> (PaginationEngine, Metrics) {
    let cfg = Arc::new(cfg);
    let metrics = Metrics::new().unwrap();
    let populator = Arc::new(AsyncPopulator::start(
        deps.cache.clone(),
        PopulatorSettings {
            workers: 2,
            queue_capacity: 64,
            ttl: cfg.cache.ttl(),
            call_timeout: cfg.timeouts.cache(),
        },
        metrics.clone(),
    ));
    (
        PaginationEngine::new(cfg, deps, populator, metrics.clone()),
        metrics,
    )
}

/// Engine over in-memory stores and cache, with handles kept for assertions.
pub struct Harness {
    pub engine: PaginationEngine,
    pub metrics: Metrics,
    pub relations: Arc<MemoryRelationStore>,
    pub counts: Arc<MemoryCountStore>,
    pub cache: Arc<MemoryRangeCache>,
}

impl Harness {
    pub fn new(cfg: Config, relations: Vec<FollowRelation>) -> Self {
        let relations = Arc::new(MemoryRelationStore::from_relations(relations));
        let counts = Arc::new(MemoryCountStore::new());
        let cache = Arc::new(MemoryRangeCache::new());
        let (engine, metrics) = engine(
            cfg,
            Collaborators {
                relations: relations.clone(),
                counts: counts.clone(),
                cache: cache.clone(),
            },
        );
        Self {
            engine,
            metrics,
            relations,
            counts,
            cache,
        }
    }

    pub async fn settle(&self) {
        self.engine.populator().wait_idle().await;
    }

    pub async fn set_counts(&self, user_id: UserId, fans_count: i64, follow_count: i64) {
        self.counts
            .set(FollowCount {
                user_id,
                fans_count,
                follow_count,
            })
            .await;
    }
}

/// Relation store whose every call fails.
pub struct FailingRelations;

#[async_trait]
impl RelationStore for FailingRelations {
    async fn recent_followers(&self, _: UserId, _: usize) -> Result<Vec<FollowRelation>, StoreError> {
        Err(StoreError::Io("connection refused".to_string()))
    }

    async fn followers_before(
        &self,
        _: UserId,
        _: i64,
        _: usize,
    ) -> Result<Vec<FollowRelation>, StoreError> {
        Err(StoreError::Io("connection refused".to_string()))
    }
}

/// Relation store that answers after a delay.
pub struct SlowRelations {
    pub delay: Duration,
    pub inner: MemoryRelationStore,
}

#[async_trait]
impl RelationStore for SlowRelations {
    async fn recent_followers(
        &self,
        target: UserId,
        limit: usize,
    ) -> Result<Vec<FollowRelation>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.recent_followers(target, limit).await
    }

    async fn followers_before(
        &self,
        target: UserId,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<FollowRelation>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.followers_before(target, cursor, limit).await
    }
}

/// Count store whose every call fails.
pub struct FailingCounts;

#[async_trait]
impl CountStore for FailingCounts {
    async fn batch_counts(&self, _: &[UserId]) -> Result<Vec<FollowCount>, StoreError> {
        Err(StoreError::Io("counts offline".to_string()))
    }
}

/// Cache whose every call fails.
pub struct FailingCache;

#[async_trait]
impl RangeCache for FailingCache {
    async fn exists(&self, _: &str) -> Result<bool, CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn refresh_ttl(&self, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn expire_at(&self, _: &str, _: SystemTime) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn range_descending(
        &self,
        _: &str,
        _: i64,
        _: i64,
        _: usize,
        _: usize,
    ) -> Result<Vec<ScoredMember>, CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn upsert(&self, _: &str, _: i64, _: UserId) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn mark_complete(&self, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }

    async fn is_complete(&self, _: &str) -> Result<bool, CacheError> {
        Err(CacheError::Backend("down".to_string()))
    }
}

/// Cache that never holds anything, so every request takes the miss path.
pub struct NullCache;

#[async_trait]
impl RangeCache for NullCache {
    async fn exists(&self, _: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn refresh_ttl(&self, _: &str, _: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn expire_at(&self, _: &str, _: SystemTime) -> Result<(), CacheError> {
        Ok(())
    }

    async fn range_descending(
        &self,
        _: &str,
        _: i64,
        _: i64,
        _: usize,
        _: usize,
    ) -> Result<Vec<ScoredMember>, CacheError> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _: &str, _: i64, _: UserId) -> Result<(), CacheError> {
        Ok(())
    }

    async fn mark_complete(&self, _: &str, _: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn is_complete(&self, _: &str) -> Result<bool, CacheError> {
        Ok(false)
    }
}

/// Count store that answers after a delay.
pub struct SlowCounts {
    pub delay: Duration,
    pub inner: MemoryCountStore,
}

#[async_trait]
impl CountStore for SlowCounts {
    async fn batch_counts(&self, user_ids: &[UserId]) -> Result<Vec<FollowCount>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.batch_counts(user_ids).await
    }
}

/// In-memory cache whose every call answers after a delay.
pub struct SlowCache {
    pub delay: Duration,
    pub inner: MemoryRangeCache,
}

#[async_trait]
impl RangeCache for SlowCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.exists(key).await
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.refresh_ttl(key, ttl).await
    }

    async fn expire_at(&self, key: &str, at: SystemTime) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.expire_at(key, at).await
    }

    async fn range_descending(
        &self,
        key: &str,
        min_score: i64,
        max_score: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .range_descending(key, min_score, max_score, offset, limit)
            .await
    }

    async fn upsert(&self, key: &str, score: i64, member: UserId) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert(key, score, member).await
    }

    async fn mark_complete(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.mark_complete(key, ttl).await
    }

    async fn is_complete(&self, key: &str) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.is_complete(key).await
    }
}

/// In-memory cache that panics on any write to `poisoned_key`.
pub struct PanickingCache {
    pub poisoned_key: String,
    pub inner: MemoryRangeCache,
}

#[async_trait]
impl RangeCache for PanickingCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner.refresh_ttl(key, ttl).await
    }

    async fn expire_at(&self, key: &str, at: SystemTime) -> Result<(), CacheError> {
        self.inner.expire_at(key, at).await
    }

    async fn range_descending(
        &self,
        key: &str,
        min_score: i64,
        max_score: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, CacheError> {
        self.inner
            .range_descending(key, min_score, max_score, offset, limit)
            .await
    }

    async fn upsert(&self, key: &str, score: i64, member: UserId) -> Result<(), CacheError> {
        if key == self.poisoned_key {
            panic!("write to {key} blew up");
        }
        self.inner.upsert(key, score, member).await
    }

    async fn mark_complete(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner.mark_complete(key, ttl).await
    }

    async fn is_complete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.is_complete(key).await
    }
}
