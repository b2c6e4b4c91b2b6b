//! fans-list: cache-aside "who follows me" pagination.
//!
//! Serves cursor-paginated fans lists from a per-user sorted range cache,
//! falling back to the durable relation store on a miss and warming the cache
//! in the background. Every fan on a page is enriched with its own
//! follower/following counts.

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pagination;
pub mod populator;
pub mod server;
pub mod store;
