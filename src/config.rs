use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Default version token.
pub const DEFAULT_CACHE_NAME: &str = "ow-pwa";

/// Default origin the asset paths are resolved against.
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000/";

/// Files required for the open-window app to run offline.
pub const DEFAULT_ASSETS: &[&str] = &[
  "/open-window/",
  "/open-window/index.html",
  "/open-window/index.css",
  "/open-window/owapp.js",
  "/open-window/owap_bg.wasm",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Version token; changing it invalidates every other cache store
  pub cache_name: String,
  /// Origin that relative asset paths and requests resolve against
  pub origin: String,
  /// Assets pre-cached at install time
  pub assets: Vec<String>,
  /// Cache database location (defaults to the data directory)
  pub database: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_name: DEFAULT_CACHE_NAME.to_string(),
      origin: DEFAULT_ORIGIN.to_string(),
      assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
      database: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./owpwa.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/owpwa/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists. Environment
  /// overrides (OWPWA_CACHE_NAME, OWPWA_ORIGIN) apply on top.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("owpwa.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("owpwa").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn with_env_overrides(self) -> Self {
    self.apply_overrides(
      std::env::var("OWPWA_CACHE_NAME").ok(),
      std::env::var("OWPWA_ORIGIN").ok(),
    )
  }

  fn apply_overrides(mut self, cache_name: Option<String>, origin: Option<String>) -> Self {
    if let Some(name) = cache_name {
      self.cache_name = name;
    }
    if let Some(origin) = origin {
      self.origin = origin;
    }
    self
  }

  /// Check the invariants the worker relies on.
  pub fn validate(&self) -> Result<()> {
    if self.cache_name.trim().is_empty() {
      return Err(eyre!("cache_name must not be empty"));
    }
    if self.assets.is_empty() {
      return Err(eyre!("assets must list at least one path"));
    }
    self.origin_url()?;
    Ok(())
  }

  /// Parsed origin URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Path of the cache database.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::cache::SqliteStorage::default_path(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_open_window_app() {
    let config = Config::default();
    assert_eq!(config.cache_name, "ow-pwa");
    assert_eq!(config.assets.len(), 5);
    assert_eq!(config.assets[1], "/open-window/index.html");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml("cache_name: ow-pwa-v2\n").unwrap();
    assert_eq!(config.cache_name, "ow-pwa-v2");
    assert_eq!(config.origin, DEFAULT_ORIGIN);
    assert_eq!(config.assets.len(), DEFAULT_ASSETS.len());
  }

  #[test]
  fn test_full_yaml() {
    let yaml = r#"
cache_name: ow-pwa-v1
origin: https://example.com/open-window/
assets:
  - ./index.html
  - ./owapp.js
database: /tmp/owpwa.db
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.assets, vec!["./index.html", "./owapp.js"]);
    assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/owpwa.db"));
    assert_eq!(
      config.origin_url().unwrap().as_str(),
      "https://example.com/open-window/"
    );
  }

  #[test]
  fn test_validate_rejects_empty_cache_name() {
    let config = Config {
      cache_name: "  ".into(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_validate_rejects_empty_assets() {
    let config = Config::from_yaml("assets: []\n").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_validate_rejects_bad_origin() {
    let config = Config {
      origin: "not a url".into(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_overrides() {
    let config = Config::default().apply_overrides(Some("ow-pwa-v9".into()), None);
    assert_eq!(config.cache_name, "ow-pwa-v9");
    assert_eq!(config.origin, DEFAULT_ORIGIN);
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    assert!(Config::load(Some(Path::new("/nonexistent/owpwa.yaml"))).is_err());
  }
}
