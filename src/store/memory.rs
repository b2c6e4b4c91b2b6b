//! In-process relation and count stores.
//!
//! Backed by `tokio::sync::RwLock`-guarded maps. Used by the binary when no
//! external database is wired in, and by the test suite.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::StoreError;
use crate::model::{sort_relations, FollowCount, FollowRelation, UserId};
use crate::store::{CountStore, RelationStore};

/// Follow relations grouped by followed user, each list kept in page order.
#[derive(Debug, Default)]
pub struct MemoryRelationStore {
    fans: RwLock<HashMap<UserId, Vec<FollowRelation>>>,
}

impl MemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_relations(relations: impl IntoIterator<Item = FollowRelation>) -> Self {
        let mut fans: HashMap<UserId, Vec<FollowRelation>> = HashMap::new();
        for rel in relations {
            fans.entry(rel.followed_user_id).or_default().push(rel);
        }
        for list in fans.values_mut() {
            sort_relations(list);
        }
        Self {
            fans: RwLock::new(fans),
        }
    }
}

#[async_trait]
impl RelationStore for MemoryRelationStore {
    async fn recent_followers(
        &self,
        target: UserId,
        limit: usize,
    ) -> Result<Vec<FollowRelation>, StoreError> {
        let fans = self.fans.read().await;
        Ok(fans
            .get(&target)
            .map(|list| list.iter().take(limit).copied().collect())
            .unwrap_or_default())
    }

    async fn followers_before(
        &self,
        target: UserId,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<FollowRelation>, StoreError> {
        let fans = self.fans.read().await;
        Ok(fans
            .get(&target)
            .map(|list| {
                list.iter()
                    .skip_while(|r| r.created_at > cursor)
                    .take(limit)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Follower/following counters keyed by user id.
#[derive(Debug, Default)]
pub struct MemoryCountStore {
    counts: RwLock<HashMap<UserId, FollowCount>>,
}

impl MemoryCountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: impl IntoIterator<Item = FollowCount>) -> Self {
        Self {
            counts: RwLock::new(counts.into_iter().map(|c| (c.user_id, c)).collect()),
        }
    }

    pub async fn set(&self, count: FollowCount) {
        self.counts.write().await.insert(count.user_id, count);
    }
}

#[async_trait]
impl CountStore for MemoryCountStore {
    async fn batch_counts(&self, user_ids: &[UserId]) -> Result<Vec<FollowCount>, StoreError> {
        let counts = self.counts.read().await;
        Ok(user_ids.iter().filter_map(|id| counts.get(id).copied()).collect())
    }
}

/// JSON fixture used to seed the in-memory stores.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub relations: Vec<FollowRelation>,
    pub counts: Vec<FollowCount>,
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&data)?;
        info!(
            relations = fixture.relations.len(),
            counts = fixture.counts.len(),
            "Loaded seed fixture"
        );
        Ok(fixture)
    }

    pub fn into_stores(self) -> (MemoryRelationStore, MemoryCountStore) {
        (
            MemoryRelationStore::from_relations(self.relations),
            MemoryCountStore::from_counts(self.counts),
        )
    }
}
