//! Per-user ordered range cache.
//!
//! The cache holds one sorted collection per target user, scored by follow
//! time, plus a completeness flag that marks the collection as the whole list.
//!
//! - [`memory`]: in-process sorted sets with lazy TTL expiry
//! - [`redis`]: Redis sorted sets (feature `redis`)

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::CacheError;
use crate::model::{ScoredMember, UserId};

/// Sorted-set cache contract.
///
/// Ranges are ordered by score descending, then member descending. `upsert`
/// is idempotent per member: writing the same member again only moves its
/// score, so concurrent population of one key converges.
#[async_trait]
pub trait RangeCache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Reset the expiry of the collection and its completeness flag to `ttl` from now.
    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Expire the collection and its flag at an absolute instant.
    async fn expire_at(&self, key: &str, at: SystemTime) -> Result<(), CacheError>;

    /// Members with `min_score <= score <= max_score`, skipping `offset`, at most `limit`.
    async fn range_descending(
        &self,
        key: &str,
        min_score: i64,
        max_score: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, CacheError>;

    async fn upsert(&self, key: &str, score: i64, member: UserId) -> Result<(), CacheError>;

    /// Flag the collection as holding the complete list, and set the expiry of
    /// both to `ttl` from now in one step.
    async fn mark_complete(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn is_complete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Cache key of a target user's fans collection.
pub fn fans_key(prefix: &str, target: UserId) -> String {
    format!("{prefix}:{target}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fans_key() {
        assert_eq!(fans_key("biz#user#fans", 42), "biz#user#fans:42");
    }
}
