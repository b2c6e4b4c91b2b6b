//! Redis-backed range cache.
//!
//! Each collection is a Redis sorted set. Members are written as zero-padded
//! decimal strings so Redis' lexicographic tie ordering matches numeric fan id
//! order. The completeness flag lives in a companion key (`{key}:complete`)
//! that shares the collection's expiry: every expiry change is written to both
//! keys in one MULTI/EXEC pipeline.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use ::redis::AsyncCommands;
use tracing::warn;

use crate::cache::RangeCache;
use crate::error::CacheError;
use crate::model::{ScoredMember, UserId};

/// Sorted-set cache stored in Redis.
#[derive(Clone)]
pub struct RedisRangeCache {
    pool: Pool,
}

impl RedisRangeCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool for `url` and wrap it.
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PoolConfig::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self::new(pool))
    }
}

fn complete_key(key: &str) -> String {
    format!("{key}:complete")
}

/// Redis rejects a zero expiry, so sub-second TTLs round up.
fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

fn expire_pipeline(key: &str, secs: i64) -> ::redis::Pipeline {
    let mut pipe = ::redis::pipe();
    pipe.atomic()
        .cmd("EXPIRE")
        .arg(key)
        .arg(secs)
        .ignore()
        .cmd("EXPIRE")
        .arg(complete_key(key))
        .arg(secs)
        .ignore();
    pipe
}

fn expire_at_pipeline(key: &str, unix_secs: i64) -> ::redis::Pipeline {
    let mut pipe = ::redis::pipe();
    pipe.atomic()
        .cmd("EXPIREAT")
        .arg(key)
        .arg(unix_secs)
        .ignore()
        .cmd("EXPIREAT")
        .arg(complete_key(key))
        .arg(unix_secs)
        .ignore();
    pipe
}

fn mark_complete_pipeline(key: &str, secs: i64) -> ::redis::Pipeline {
    let mut pipe = ::redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(complete_key(key))
        .arg(1)
        .arg("EX")
        .arg(secs)
        .ignore()
        .cmd("EXPIRE")
        .arg(key)
        .arg(secs)
        .ignore();
    pipe
}

fn encode_member(member: UserId) -> String {
    format!("{member:020}")
}

fn decode_member(raw: &str) -> Option<UserId> {
    raw.parse().ok()
}

#[async_trait]
impl RangeCache for RedisRangeCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists(key).await?)
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: () = expire_pipeline(key, ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn expire_at(&self, key: &str, at: SystemTime) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let ts = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let _: () = expire_at_pipeline(key, ts).query_async(&mut conn).await?;
        Ok(())
    }

    async fn range_descending(
        &self,
        key: &str,
        min_score: i64,
        max_score: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, CacheError> {
        let mut conn = self.pool.get().await?;
        let pairs: Vec<(String, i64)> = conn
            .zrevrangebyscore_limit_withscores(key, max_score, min_score, offset as isize, limit as isize)
            .await?;

        Ok(pairs
            .into_iter()
            .filter_map(|(raw, score)| match decode_member(&raw) {
                Some(member) => Some(ScoredMember { member, score }),
                None => {
                    warn!(key, member = %raw, "Skipping undecodable cache member");
                    None
                }
            })
            .collect())
    }

    async fn upsert(&self, key: &str, score: i64, member: UserId) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.zadd::<_, _, _, ()>(key, encode_member(member), score).await?;
        Ok(())
    }

    async fn mark_complete(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: () = mark_complete_pipeline(key, ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_complete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists(complete_key(key)).await?)
    }
}
