//! Cache layer that orchestrates cache lookups with network fetching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::storage::CacheStorage;
use super::traits::{CacheResult, Request, Response};

/// Cache layer that resolves requests against one named cache store.
///
/// This layer sits between the worker and the network client and
/// implements the cache-first policy.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// The underlying storage backend.
  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Resolve a request with a cache-first strategy.
  ///
  /// 1. Check the store - if the request is cached, return it immediately
  /// 2. Otherwise call the fetcher and return its result unchanged
  ///
  /// The network response is not written back: only entries put there at
  /// install time are ever served from cache.
  pub async fn cache_first<F, Fut>(
    &self,
    cache_name: &str,
    request: &Request,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    let key = request.key();

    if let Some(cached) = self.storage.match_request(cache_name, &key)? {
      debug!(%key, cache = cache_name, "responding with cache");
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    debug!(%key, cache = cache_name, "not cached, fetching");
    let response = fetcher().await?;
    Ok(CacheResult::from_network(response))
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use crate::cache::traits::CacheSource;
  use color_eyre::eyre::eyre;
  use url::Url;

  fn request(path: &str) -> Request {
    Request::get(Url::parse("http://localhost:3000/").unwrap().join(path).unwrap())
  }

  fn response(body: &str) -> Response {
    Response {
      status: 200,
      headers: Vec::new(),
      body: body.as_bytes().to_vec(),
    }
  }

  #[tokio::test]
  async fn test_hit_skips_fetcher() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put_all("v1", &[(request("index.html").key(), response("cached"))])
      .unwrap();
    let layer = CacheLayer::new(storage);

    let result = layer
      .cache_first("v1", &request("index.html"), || async {
        Err::<Response, _>(eyre!("fetcher must not run on a hit"))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert!(result.cached_at.is_some());
    assert_eq!(result.data.body, b"cached");
  }

  #[tokio::test]
  async fn test_miss_is_not_written_back() {
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap());
    layer.storage().open_cache("v1").unwrap();

    let result = layer
      .cache_first("v1", &request("other.png"), || async { Ok(response("live")) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.body, b"live");
    assert!(layer.storage().keys("v1").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_miss_propagates_fetch_error() {
    let layer = CacheLayer::new(SqliteStorage::open_in_memory().unwrap());

    let result = layer
      .cache_first("v1", &request("other.png"), || async {
        Err::<Response, _>(eyre!("connection refused"))
      })
      .await;

    assert!(result.is_err());
  }
}
