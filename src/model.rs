//! Data model: follow relations, counts, and the fans page projection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// User identifier. Zero is never a valid user.
pub type UserId = i64;

/// A follow edge: `follower_id` follows `followed_user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRelation {
    pub follower_id: UserId,
    pub followed_user_id: UserId,
    /// Unix seconds.
    pub created_at: i64,
}

/// Follower/following counters for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowCount {
    pub user_id: UserId,
    pub fans_count: i64,
    pub follow_count: i64,
}

/// One entry of a fans page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FansItem {
    pub target_user_id: UserId,
    pub fan_user_id: UserId,
    pub created_at: i64,
    pub fans_count: i64,
    pub follow_count: i64,
}

impl FansItem {
    pub fn new(target_user_id: UserId, fan_user_id: UserId, created_at: i64) -> Self {
        Self {
            target_user_id,
            fan_user_id,
            created_at,
            fans_count: 0,
            follow_count: 0,
        }
    }
}

impl From<&FollowRelation> for FansItem {
    fn from(rel: &FollowRelation) -> Self {
        FansItem::new(rel.followed_user_id, rel.follower_id, rel.created_at)
    }
}

/// A cache member with its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: UserId,
    pub score: i64,
}

impl From<&FollowRelation> for ScoredMember {
    fn from(rel: &FollowRelation) -> Self {
        ScoredMember {
            member: rel.follower_id,
            score: rel.created_at,
        }
    }
}

/// Page ordering: newest first, ties broken by the larger fan id first.
///
/// Every read path sorts with this so cache and store pages agree.
pub fn fans_order(a_created: i64, a_fan: UserId, b_created: i64, b_fan: UserId) -> Ordering {
    (b_created, b_fan).cmp(&(a_created, a_fan))
}

/// Sort relations into page order in place.
pub fn sort_relations(relations: &mut [FollowRelation]) {
    relations.sort_by(|a, b| fans_order(a.created_at, a.follower_id, b.created_at, b.follower_id));
}

/// Incoming page request. Zero / negative fields mean "unset".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FansPageRequest {
    pub target_user_id: UserId,
    pub cursor: i64,
    pub page_size: i32,
    pub boundary_fan_id: UserId,
}

/// Where a page was assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSource {
    /// Built from the range cache.
    Cache,
    /// Built from the warm batch read on a cache miss.
    #[default]
    Store,
    /// Read straight from the relation store past a partial cache window.
    Deep,
}

impl PageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSource::Cache => "cache",
            PageSource::Store => "store",
            PageSource::Deep => "deep",
        }
    }
}

/// A page of fans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FansPage {
    pub items: Vec<FansItem>,
    pub next_cursor: i64,
    pub is_end: bool,
    pub last_fan_id: UserId,
    #[serde(skip)]
    pub source: PageSource,
}
