//! Named cache stores for offline assets.
//!
//! This module provides the storage side of the offline worker:
//! - Request keys normalized from method + URL
//! - Persistent, named cache stores (one per version token)
//! - A cache-first lookup layer that never writes network responses back

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheResult, Method, Request, RequestKey, Response};

#[cfg(test)]
pub use traits::{CacheSource, CachedResponse};
