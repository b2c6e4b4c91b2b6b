//! Pagination engine: serves fans pages through the range cache.
//!
//! The engine is the top-level component that:
//! 1. Validates and normalizes the request
//! 2. Serves the page from the range cache when the target's collection exists
//! 3. Falls back to the relation store on a miss and schedules cache warming
//! 4. Skips items the previous page already returned at the cursor's timestamp
//! 5. Derives the next cursor and enriches every fan with follower/following counts
//!
//! Every path skips the boundary fan before cutting the page to size, so a run
//! of fans sharing one timestamp never stalls pagination.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::cache::{fans_key, RangeCache};
use crate::config::Config;
use crate::error::{CacheError, FansError, StoreError};
use crate::metrics::Metrics;
use crate::model::{
    sort_relations, FansItem, FansPage, FansPageRequest, PageSource, ScoredMember, UserId,
};
use crate::populator::{AsyncPopulator, PopulateJob};
use crate::store::{CountStore, RelationStore};

/// Stores and cache the engine reads from.
#[derive(Clone)]
pub struct Collaborators {
    pub relations: Arc<dyn RelationStore>,
    pub counts: Arc<dyn CountStore>,
    pub cache: Arc<dyn RangeCache>,
}

/// A request after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub target: UserId,
    pub cursor: i64,
    pub page_size: usize,
    pub boundary_fan_id: UserId,
}

/// Page contents before cursor derivation and enrichment.
struct Assembled {
    items: Vec<FansItem>,
    is_end: bool,
    source: PageSource,
    warm: Option<PopulateJob>,
}

enum CacheRead {
    /// Page served from the collection.
    Hit { items: Vec<FansItem>, is_end: bool },
    /// The collection is a partial prefix and ran out before a full page.
    Exhausted,
    Miss,
}

/// The fans pagination engine.
pub struct PaginationEngine {
    deps: Collaborators,
    populator: Arc<AsyncPopulator>,
    metrics: Metrics,
    config: Arc<Config>,
}

impl PaginationEngine {
    pub fn new(
        config: Arc<Config>,
        deps: Collaborators,
        populator: Arc<AsyncPopulator>,
        metrics: Metrics,
    ) -> Self {
        Self {
            deps,
            populator,
            metrics,
            config,
        }
    }

    pub fn populator(&self) -> &Arc<AsyncPopulator> {
        &self.populator
    }

    /// Apply defaults: unset cursor means now, unset page size means the default.
    pub fn normalize(&self, req: &FansPageRequest, now: i64) -> Result<PageQuery, FansError> {
        if req.target_user_id == 0 {
            return Err(FansError::InvalidArgument("target_user_id is required"));
        }
        let p = &self.config.pagination;
        let page_size = if req.page_size <= 0 {
            p.default_page_size
        } else {
            (req.page_size as usize).min(p.max_page_size)
        };
        let cursor = if req.cursor <= 0 { now } else { req.cursor };

        Ok(PageQuery {
            target: req.target_user_id,
            cursor,
            page_size,
            boundary_fan_id: req.boundary_fan_id,
        })
    }

    /// Fetch one page of `target_user_id`'s fans, newest first.
    pub async fn get_fans_page(&self, req: FansPageRequest) -> Result<FansPage, FansError> {
        let query = self.normalize(&req, unix_now())?;
        let key = fans_key(&self.config.cache.key_prefix, query.target);

        let assembled = match self.read_cache(&key, &query).await {
            CacheRead::Hit { items, is_end } => Assembled {
                items,
                is_end,
                source: PageSource::Cache,
                warm: None,
            },
            CacheRead::Exhausted => self.read_deep(&query).await?,
            CacheRead::Miss => self.read_store(&key, &query).await?,
        };

        let mut items = assembled.items;
        let (next_cursor, last_fan_id) = items
            .last()
            .map_or((0, 0), |last| (last.created_at.max(0), last.fan_user_id));

        self.enrich(&mut items).await;

        let label = if items.is_empty() {
            "empty"
        } else {
            assembled.source.as_str()
        };
        self.metrics.requests.with_label_values(&[label]).inc();
        debug!(
            target_user_id = query.target,
            cursor = query.cursor,
            page_size = query.page_size,
            items = items.len(),
            is_end = assembled.is_end,
            source = assembled.source.as_str(),
            "Served fans page"
        );

        if let Some(job) = assembled.warm {
            self.populator.dispatch(job);
        }

        Ok(FansPage {
            items,
            next_cursor,
            is_end: assembled.is_end,
            last_fan_id,
            source: assembled.source,
        })
    }

    async fn read_cache(&self, key: &str, q: &PageQuery) -> CacheRead {
        match self.cache_call("exists", self.deps.cache.exists(key)).await {
            Ok(true) => {}
            Ok(false) | Err(_) => return CacheRead::Miss,
        }

        // Sliding expiry; a failed refresh still lets the hit through.
        let _ = self
            .cache_call(
                "refresh_ttl",
                self.deps.cache.refresh_ttl(key, self.config.cache.ttl()),
            )
            .await;

        let offset = if q.boundary_fan_id != 0 {
            let ties = match self.cursor_ties(key, q).await {
                Ok(ties) => ties,
                Err(_) => return CacheRead::Miss,
            };
            match ties.iter().position(|m| m.member == q.boundary_fan_id) {
                Some(pos) => pos + 1,
                None if ties.is_empty() => 0,
                // The boundary may sit in the uncached tail of its tie group.
                None if !self.is_complete(key).await => return CacheRead::Exhausted,
                None => 0,
            }
        } else {
            0
        };

        let limit = q.page_size + 1;
        let entries = match self
            .cache_call(
                "range",
                self.deps
                    .cache
                    .range_descending(key, i64::MIN, q.cursor, offset, limit),
            )
            .await
        {
            Ok(entries) => entries,
            Err(_) => return CacheRead::Miss,
        };

        if entries.len() > q.page_size {
            return CacheRead::Hit {
                items: to_items(q.target, &entries[..q.page_size]),
                is_end: false,
            };
        }

        if self.is_complete(key).await {
            CacheRead::Hit {
                items: to_items(q.target, &entries),
                is_end: true,
            }
        } else if entries.len() == q.page_size {
            CacheRead::Hit {
                items: to_items(q.target, &entries),
                is_end: false,
            }
        } else {
            CacheRead::Exhausted
        }
    }

    /// Cached entries sharing the cursor's score, in page order.
    async fn cursor_ties(&self, key: &str, q: &PageQuery) -> Result<Vec<ScoredMember>, CacheError> {
        self.cache_call(
            "range",
            self.deps.cache.range_descending(
                key,
                q.cursor,
                q.cursor,
                0,
                self.config.pagination.max_warm_count,
            ),
        )
        .await
    }

    async fn is_complete(&self, key: &str) -> bool {
        self.cache_call("is_complete", self.deps.cache.is_complete(key))
            .await
            .unwrap_or(false)
    }

    /// Cache miss: read the warm batch, cut the page out of it, and queue the
    /// batch for population.
    async fn read_store(&self, key: &str, q: &PageQuery) -> Result<Assembled, FansError> {
        let max_warm = self.config.pagination.max_warm_count;
        let mut batch = self
            .relation_call(self.deps.relations.recent_followers(q.target, max_warm))
            .await
            .inspect_err(|e| {
                error!(target_user_id = q.target, error = %e, "Relation store read failed on cache miss")
            })?;

        if batch.is_empty() {
            return Ok(Assembled {
                items: Vec::new(),
                is_end: self.config.pagination.empty_source_is_end,
                source: PageSource::Store,
                warm: None,
            });
        }

        sort_relations(&mut batch);
        let complete = batch.len() < max_warm;
        let warm = Some(PopulateJob {
            key: key.to_string(),
            entries: batch.iter().map(ScoredMember::from).collect(),
            complete,
        });

        let mut candidates: Vec<FansItem> = batch
            .iter()
            .filter(|r| r.created_at <= q.cursor)
            .map(FansItem::from)
            .collect();
        let stripped = strip_boundary(&mut candidates, q.cursor, q.boundary_fan_id);

        // A partial batch that ends inside the cursor's tie group may not
        // reach the boundary fan at all.
        let unseen = boundary_unseen(&candidates, q, stripped);
        if !complete && (unseen || candidates.len() < q.page_size) {
            let mut deep = self.read_deep(q).await?;
            deep.warm = warm;
            return Ok(deep);
        }

        candidates.truncate(q.page_size);
        Ok(Assembled {
            items: candidates,
            is_end: complete,
            source: PageSource::Store,
            warm,
        })
    }

    /// Read a page straight from the relation store, past the cached window.
    ///
    /// The fetch widens until it reaches past the boundary fan with a full
    /// page behind it, or the store runs out of rows.
    async fn read_deep(&self, q: &PageQuery) -> Result<Assembled, FansError> {
        let mut limit = q.page_size + 1;
        loop {
            let (mut items, fetched) = self.fetch_before(q, limit).await?;
            let stripped = strip_boundary(&mut items, q.cursor, q.boundary_fan_id);
            let exhausted = fetched < limit;

            if !exhausted && boundary_unseen(&items, q, stripped) {
                limit *= 2;
                continue;
            }
            if !exhausted && items.len() <= q.page_size {
                limit = q.page_size + stripped + 1;
                continue;
            }

            items.truncate(q.page_size);
            return Ok(Assembled {
                items,
                is_end: exhausted,
                source: PageSource::Deep,
                warm: None,
            });
        }
    }

    async fn fetch_before(
        &self,
        q: &PageQuery,
        limit: usize,
    ) -> Result<(Vec<FansItem>, usize), FansError> {
        let mut rels = self
            .relation_call(self.deps.relations.followers_before(q.target, q.cursor, limit))
            .await
            .inspect_err(|e| {
                error!(target_user_id = q.target, cursor = q.cursor, error = %e, "Relation store deep read failed")
            })?;
        sort_relations(&mut rels);
        let fetched = rels.len();
        Ok((rels.iter().map(FansItem::from).collect(), fetched))
    }

    /// Fill fans/follow counts. Failures leave every count at zero.
    async fn enrich(&self, items: &mut [FansItem]) {
        if items.is_empty() {
            return;
        }
        let ids: Vec<UserId> = items.iter().map(|i| i.fan_user_id).collect();
        let budget = self.config.timeouts.count_store();
        let counts = match with_budget(budget, self.deps.counts.batch_counts(&ids)).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(fans = ids.len(), error = %e, "Count lookup failed, zero-filling counts");
                self.metrics.count_lookup_failures.inc();
                return;
            }
        };

        let by_id: HashMap<UserId, _> = counts.into_iter().map(|c| (c.user_id, c)).collect();
        for item in items.iter_mut() {
            if let Some(c) = by_id.get(&item.fan_user_id) {
                item.fans_count = c.fans_count;
                item.follow_count = c.follow_count;
            }
        }
    }

    async fn relation_call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, FansError> {
        with_budget(self.config.timeouts.relation_store(), fut)
            .await
            .map_err(FansError::StoreUnavailable)
    }

    async fn cache_call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let budget = self.config.timeouts.cache();
        let result = match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(budget)),
        };
        if let Err(e) = &result {
            warn!(op, error = %e, "Range cache call failed, falling back");
            self.metrics.cache_errors.with_label_values(&[op]).inc();
        }
        result
    }
}

async fn with_budget<T>(
    budget: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(budget)),
    }
}

fn to_items(target: UserId, entries: &[ScoredMember]) -> Vec<FansItem> {
    entries
        .iter()
        .map(|m| FansItem::new(target, m.member, m.score))
        .collect()
}

/// Drop the previous page's last item, and everything before it, when it
/// reappears because it shares the cursor's timestamp. Returns how many items
/// were dropped.
pub fn strip_boundary(items: &mut Vec<FansItem>, cursor: i64, boundary_fan_id: UserId) -> usize {
    match items
        .iter()
        .position(|i| i.created_at == cursor && i.fan_user_id == boundary_fan_id)
    {
        Some(pos) => {
            items.drain(..=pos);
            pos + 1
        }
        None => 0,
    }
}

/// True when a boundary was requested, was not found, and every remaining
/// item still shares the cursor's timestamp, so the boundary may lie further on.
fn boundary_unseen(items: &[FansItem], q: &PageQuery, stripped: usize) -> bool {
    stripped == 0
        && q.boundary_fan_id != 0
        && items.last().is_some_and(|i| i.created_at == q.cursor)
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
