//! HTTP server exposing the fans list.
//!
//! - [`api`]: Request/response types and route handlers

pub mod api;
