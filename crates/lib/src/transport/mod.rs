//! HTTP transport abstraction.
//!
//! The engine never talks to `reqwest` directly: the manifest client, the file fetcher and the
//! package installer are generic over [`HttpTransport`], which opens a URL and hands back a
//! streamed [`ResponseBody`]. [`ReqwestTransport`] is the production implementation; tests
//! substitute scripted transports to count calls and inject failures.

mod client;

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use client::{ReqwestBody, ReqwestTransport};

/// Quota metadata reported by a rate-limited remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitQuota {
  /// Requests allowed per window (`x-ratelimit-limit`).
  pub limit: Option<u64>,
  /// Requests left in the current window (`x-ratelimit-remaining`).
  pub remaining: Option<u64>,
  /// When the window resets (`x-ratelimit-reset`, or derived from `retry-after`).
  pub reset_at: Option<DateTime<Utc>>,
}

impl std::fmt::Display for RateLimitQuota {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (self.remaining, self.limit) {
      (Some(remaining), Some(limit)) => write!(f, "{}/{} requests remaining", remaining, limit)?,
      (Some(remaining), None) => write!(f, "{} requests remaining", remaining)?,
      _ => write!(f, "quota unknown")?,
    }
    if let Some(reset_at) = self.reset_at {
      write!(f, ", resets at {}", reset_at.to_rfc3339())?;
    }
    Ok(())
  }
}

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The remote could not be reached or the connection broke mid-body.
  #[error("request to {url} failed: {message}")]
  Network { url: String, message: String },

  /// The remote answered with a non-success status.
  #[error("request to {url} returned HTTP {status}")]
  Status { url: String, status: u16 },

  /// The remote signalled quota exhaustion.
  #[error("rate limited by {url} ({quota})")]
  RateLimited { url: String, quota: RateLimitQuota },

  /// Local I/O failed while consuming the body.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl FetchError {
  pub fn is_rate_limited(&self) -> bool {
    matches!(self, FetchError::RateLimited { .. })
  }
}

/// A response body read chunk by chunk.
pub trait ResponseBody: Send {
  /// The declared `Content-Length`, when the remote sent one.
  fn content_length(&self) -> Option<u64>;

  /// Read the next chunk. `Ok(None)` marks the end of the body.
  fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, FetchError>> + Send;
}

/// Opens URLs for reading.
///
/// Implementations map remote status codes onto [`FetchError`]: a returned body always belongs
/// to a successful response.
pub trait HttpTransport: Send + Sync {
  type Body: ResponseBody;

  fn open(&self, url: &str) -> impl Future<Output = Result<Self::Body, FetchError>> + Send;
}

/// Open `url` and read the whole body into memory.
pub async fn get_bytes<T: HttpTransport>(transport: &T, url: &str) -> Result<Vec<u8>, FetchError> {
  let mut body = transport.open(url).await?;
  let mut bytes = Vec::with_capacity(body.content_length().unwrap_or(0) as usize);
  while let Some(chunk) = body.next_chunk().await? {
    bytes.extend_from_slice(&chunk);
  }
  Ok(bytes)
}
