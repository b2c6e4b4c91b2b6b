//! Durable store contracts consumed by the pagination engine.
//!
//! - [`RelationStore`]: follow edges, newest first
//! - [`CountStore`]: follower/following counters by user id
//! - [`memory`]: in-process implementations used by the binary and tests

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{FollowCount, FollowRelation, UserId};

/// Source of truth for follow relationships.
///
/// Results are ordered newest first. Relations sharing a timestamp may come
/// back in any order; the engine re-sorts them.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Up to `limit` most recent followers of `target`.
    async fn recent_followers(
        &self,
        target: UserId,
        limit: usize,
    ) -> Result<Vec<FollowRelation>, StoreError>;

    /// Up to `limit` followers of `target` created at or before `cursor`.
    async fn followers_before(
        &self,
        target: UserId,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<FollowRelation>, StoreError>;
}

/// Batch lookup of follower/following counts.
#[async_trait]
pub trait CountStore: Send + Sync {
    /// Counts for the given users. Ids with no row are absent from the result.
    async fn batch_counts(&self, user_ids: &[UserId]) -> Result<Vec<FollowCount>, StoreError>;
}
