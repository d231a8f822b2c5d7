//! Core types for the caching system: requests, responses and their keys.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
  #[default]
  Get,
  Head,
  Post,
  Put,
  Delete,
  Options,
  Patch,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Head => "HEAD",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Delete => "DELETE",
      Self::Options => "OPTIONS",
      Self::Patch => "PATCH",
    }
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
      Method::Options => reqwest::Method::OPTIONS,
      Method::Patch => reqwest::Method::PATCH,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

impl FromStr for Method {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Self::Get),
      "HEAD" => Ok(Self::Head),
      "POST" => Ok(Self::Post),
      "PUT" => Ok(Self::Put),
      "DELETE" => Ok(Self::Delete),
      "OPTIONS" => Ok(Self::Options),
      "PATCH" => Ok(Self::Patch),
      other => Err(eyre!("Unsupported request method: {}", other)),
    }
  }
}

/// A resource request as seen by the fetch interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
}

impl Request {
  /// Create a GET request for an absolute URL.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
    }
  }

  /// Normalized cache key for this request.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(self.method, &self.url)
  }
}

/// Normalized request identifier used as the storage key.
///
/// The fragment never reaches the server, so two URLs that differ only in
/// their fragment map to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: Method,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method,
      url: url.into(),
    }
  }

  /// Stable, fixed-length hash of method and URL.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Full response payload: status, headers and body.
///
/// Header values are kept as raw bytes; they are not required to be ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, Vec<u8>)>,
  pub body: Vec<u8>,
}

impl Response {
  /// True for 2xx statuses.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value with the given (case-insensitive) name.
  pub fn header(&self, name: &str) -> Option<&[u8]> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_slice())
  }

  /// Header value as text, if present and valid UTF-8.
  pub fn header_str(&self, name: &str) -> Option<&str> {
    self.header(name).and_then(|v| std::str::from_utf8(v).ok())
  }
}

/// A response read back from a cache store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Live network fetch after a cache miss
  Network,
  /// Served from the current cache store
  Cache,
}

impl fmt::Display for CacheSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Network => f.pad("network"),
      Self::Cache => f.pad("cache"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_key_ignores_fragment() {
    let a = Request::get(url("http://localhost:3000/open-window/index.html#top")).key();
    let b = Request::get(url("http://localhost:3000/open-window/index.html")).key();
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_key_distinguishes_method() {
    let u = url("http://localhost:3000/open-window");
    let get = RequestKey::new(Method::Get, &u);
    let post = RequestKey::new(Method::Post, &u);
    assert_ne!(get.cache_hash(), post.cache_hash());
  }

  #[test]
  fn test_key_keeps_query() {
    let a = Request::get(url("http://localhost:3000/a.js?v=1")).key();
    let b = Request::get(url("http://localhost:3000/a.js?v=2")).key();
    assert_ne!(a, b);
  }

  #[test]
  fn test_method_parse() {
    assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
    assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
    assert!("BREW".parse::<Method>().is_err());
  }

  #[test]
  fn test_method_into_reqwest() {
    assert_eq!(reqwest::Method::from(Method::Get), reqwest::Method::GET);
    assert_eq!(reqwest::Method::from(Method::Options), reqwest::Method::OPTIONS);
  }

  #[test]
  fn test_header_str_rejects_invalid_utf8() {
    let response = Response {
      status: 200,
      headers: vec![("x-name".into(), b"caf\xE9".to_vec())],
      body: Vec::new(),
    };
    assert_eq!(response.header("x-name"), Some(&b"caf\xE9"[..]));
    assert_eq!(response.header_str("x-name"), None);
  }

  #[test]
  fn test_response_is_ok_and_header() {
    let response = Response {
      status: 204,
      headers: vec![("Content-Type".into(), "text/html".into())],
      body: Vec::new(),
    };
    assert!(response.is_ok());
    assert_eq!(response.header_str("content-type"), Some("text/html"));
    assert_eq!(response.header("CONTENT-TYPE"), Some(&b"text/html"[..]));

    let missing = Response {
      status: 404,
      ..response
    };
    assert!(!missing.is_ok());
  }
}
