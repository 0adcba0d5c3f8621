//! Client-side sync layer for the order desk backend.
//!
//! Reads go through a shared query cache with per-resource freshness and an
//! offline fallback; writes are applied optimistically and rolled back when
//! the backend refuses them.

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod notify;
pub mod query;
pub mod sync;
