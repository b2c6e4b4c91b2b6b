//! In-process range cache.
//!
//! Each key maps to a sorted set kept in two indexes: member → score for
//! idempotent upserts, and an ordered set for descending range scans.
//! Expired collections are dropped lazily on access and by [`MemoryRangeCache::sweep_expired`].

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::RangeCache;
use crate::error::CacheError;
use crate::model::{ScoredMember, UserId};

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<UserId, i64>,
    // Reverse so forward iteration yields score desc, member desc.
    ordered: BTreeSet<Reverse<(i64, UserId)>>,
    complete: bool,
    expires_at: Option<Instant>,
}

impl SortedSet {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn upsert(&mut self, score: i64, member: UserId) {
        if let Some(old) = self.scores.insert(member, score) {
            self.ordered.remove(&Reverse((old, member)));
        }
        self.ordered.insert(Reverse((score, member)));
    }
}

/// Sorted-set cache held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRangeCache {
    sets: RwLock<HashMap<String, SortedSet>>,
}

impl MemoryRangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live members under `key`.
    pub async fn len(&self, key: &str) -> usize {
        let now = Instant::now();
        let sets = self.sets.read().await;
        sets.get(key)
            .filter(|set| !set.is_expired(now))
            .map_or(0, |set| set.scores.len())
    }

    /// Remaining lifetime of `key`, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let sets = self.sets.read().await;
        sets.get(key)
            .filter(|set| !set.is_expired(now))
            .and_then(|set| set.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live collections.
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        self.sets
            .read()
            .await
            .values()
            .filter(|set| !set.is_expired(now))
            .count()
    }

    /// Drop every expired collection. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sets = self.sets.write().await;
        let before = sets.len();
        sets.retain(|_, set| !set.is_expired(now));
        let removed = before - sets.len();
        if removed > 0 {
            debug!(removed, "Swept expired fans collections");
        }
        removed
    }
}

#[async_trait]
impl RangeCache for MemoryRangeCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let sets = self.sets.read().await;
        Ok(sets.get(key).is_some_and(|set| !set.is_expired(now)))
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut sets = self.sets.write().await;
        let expired = match sets.get_mut(key) {
            Some(set) if set.is_expired(now) => true,
            Some(set) => {
                set.expires_at = Some(now + ttl);
                false
            }
            None => false,
        };
        if expired {
            sets.remove(key);
        }
        Ok(())
    }

    async fn expire_at(&self, key: &str, at: SystemTime) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut sets = self.sets.write().await;
        match at.duration_since(SystemTime::now()) {
            Ok(remaining) if !remaining.is_zero() => {
                if let Some(set) = sets.get_mut(key) {
                    set.expires_at = Some(now + remaining);
                }
            }
            _ => {
                sets.remove(key);
            }
        }
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
        let now = Instant::now();
        let sets = self.sets.read().await;
        let Some(set) = sets.get(key).filter(|set| !set.is_expired(now)) else {
            return Ok(Vec::new());
        };
        if min_score > max_score {
            return Ok(Vec::new());
        }

        Ok(set
            .ordered
            .range(Reverse((max_score, UserId::MAX))..)
            .map(|Reverse((score, member))| ScoredMember {
                member: *member,
                score: *score,
            })
            .take_while(|m| m.score >= min_score)
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn upsert(&self, key: &str, score: i64, member: UserId) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut sets = self.sets.write().await;
        let set = sets.entry(key.to_string()).or_default();
        if set.is_expired(now) {
            *set = SortedSet::default();
        }
        set.upsert(score, member);
        Ok(())
    }

    async fn mark_complete(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut sets = self.sets.write().await;
        if let Some(set) = sets.get_mut(key).filter(|set| !set.is_expired(now)) {
            set.complete = true;
            set.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn is_complete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let sets = self.sets.read().await;
        Ok(sets
            .get(key)
            .is_some_and(|set| !set.is_expired(now) && set.complete))
    }
}
