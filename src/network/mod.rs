//! Network access for the offline worker.

mod client;

pub use client::HttpClient;

use color_eyre::Result;
use std::future::Future;

use crate::cache::{Request, Response};

/// Something that can perform a live fetch of a request.
///
/// Non-2xx responses are returned as `Ok`; only transport failures are errors.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}
