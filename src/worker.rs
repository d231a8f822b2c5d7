//! The offline worker: installer, fetch interceptor and cache janitor.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheResult, CacheStorage, Request, RequestKey, Response};
use crate::config::Config;
use crate::network::Network;

/// Settings the worker is built with.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
  /// Current version token
  pub cache_name: String,
  /// Base URL for relative paths
  pub origin: Url,
  /// Paths pre-cached on install
  pub assets: Vec<String>,
}

impl WorkerOptions {
  pub fn from_config(config: &Config) -> Result<Self> {
    Ok(Self {
      cache_name: config.cache_name.clone(),
      origin: config.origin_url()?,
      assets: config.assets.clone(),
    })
  }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cache_name: String,
  /// Number of entries in the store afterwards
  pub entries: usize,
}

/// Outcome of a janitor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  /// The current store
  pub kept: String,
  pub deleted: Vec<String>,
  /// Stale stores whose deletion failed
  pub failed: Vec<String>,
}

/// Offline asset cache manager.
///
/// Holds the storage handle, the network client and the version token, and
/// reacts to the install, fetch and activate lifecycle signals.
pub struct OfflineWorker<S: CacheStorage, N: Network> {
  cache: CacheLayer<S>,
  network: N,
  options: WorkerOptions,
}

impl<S: CacheStorage, N: Network> OfflineWorker<S, N> {
  pub fn new(storage: S, network: N, options: WorkerOptions) -> Self {
    Self {
      cache: CacheLayer::new(storage),
      network,
      options,
    }
  }

  pub fn cache_name(&self) -> &str {
    &self.options.cache_name
  }

  pub fn storage(&self) -> &S {
    self.cache.storage()
  }

  /// Build a GET request for a path relative to the origin.
  pub fn request(&self, path: &str) -> Result<Request> {
    let url = self
      .options
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))?;
    Ok(Request::get(url))
  }

  /// Install: pre-cache every asset into the current store.
  ///
  /// All assets are fetched before anything is written. Any transport error
  /// or non-2xx response fails the whole install and leaves the store
  /// without new entries.
  pub async fn install(&self) -> Result<InstallReport> {
    let name = self.cache_name();
    self.storage().open_cache(name)?;

    let requests = self
      .options
      .assets
      .iter()
      .map(|path| self.request(path))
      .collect::<Result<Vec<_>>>()?;

    let entries = try_join_all(requests.iter().map(|request| self.fetch_asset(request))).await?;

    self.storage().put_all(name, &entries)?;
    let entries = self.storage().keys(name)?.len();

    info!(cache = name, entries, "installed offline assets");
    Ok(InstallReport {
      cache_name: name.to_string(),
      entries,
    })
  }

  async fn fetch_asset(&self, request: &Request) -> Result<(RequestKey, Response)> {
    let response = self.network.fetch(request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "Failed to cache {}: status {}",
        request.url,
        response.status
      ));
    }
    debug!(url = %request.url, bytes = response.body.len(), "cached asset");
    Ok((request.key(), response))
  }

  /// Intercept a request: serve it from the current store, else from the network.
  ///
  /// Network responses are returned unchanged and are not cached.
  pub async fn fetch(&self, request: &Request) -> Result<CacheResult<Response>> {
    debug!(url = %request.url, method = %request.method, "fetched resource");
    self
      .cache
      .cache_first(self.cache_name(), request, || self.network.fetch(request))
      .await
  }

  /// Activate: delete every store whose name differs from the current one.
  ///
  /// Refuses to run until the current store has been installed, so a failed
  /// install never evicts the version that is still serving. A failed
  /// deletion is logged and skipped so the remaining stale stores are still
  /// cleaned up.
  pub async fn activate(&self) -> Result<ActivateReport> {
    let current = self.cache_name();
    if !self.storage().is_installed(current)? {
      return Err(eyre!(
        "Cache {} has not been installed; refusing to activate",
        current
      ));
    }

    let mut report = ActivateReport {
      kept: current.to_string(),
      ..ActivateReport::default()
    };

    for name in self.storage().cache_names()? {
      if name == current {
        continue;
      }

      match self.storage().delete_cache(&name) {
        Ok(true) => {
          info!(cache = %name, "deleted stale cache");
          report.deleted.push(name);
        }
        Ok(false) => debug!(cache = %name, "stale cache already gone"),
        Err(e) => {
          warn!(cache = %name, error = %e, "failed to delete stale cache");
          report.failed.push(name);
        }
      }
    }

    Ok(report)
  }
}
