//! Fans list pagination.
//!
//! - [`engine`]: cache-aside page assembly, boundary dedup and count enrichment

pub mod engine;

pub use engine::{Collaborators, PageQuery, PaginationEngine};
