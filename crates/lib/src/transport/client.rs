//! `reqwest`-backed transport.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::debug;

use super::{FetchError, HttpTransport, RateLimitQuota, ResponseBody};
use crate::consts::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, USER_AGENT};

const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  /// Build a transport with explicit timeouts.
  pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .connect_timeout(connect_timeout)
      .timeout(timeout)
      .build()
      .map_err(|e| FetchError::Network {
        url: String::new(),
        message: format!("failed to build HTTP client: {}", e),
      })?;
    Ok(Self { client })
  }

  /// Build a transport with the default timeouts.
  pub fn with_defaults() -> Result<Self, FetchError> {
    Self::new(
      Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
      Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
    )
  }
}

/// Streamed body of a successful `reqwest` response.
pub struct ReqwestBody {
  url: String,
  response: reqwest::Response,
}

impl ResponseBody for ReqwestBody {
  fn content_length(&self) -> Option<u64> {
    self.response.content_length()
  }

  async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
    let chunk = self.response.chunk().await.map_err(|e| FetchError::Network {
      url: self.url.clone(),
      message: e.to_string(),
    })?;
    Ok(chunk.map(|bytes| bytes.to_vec()))
  }
}

impl HttpTransport for ReqwestTransport {
  type Body = ReqwestBody;

  async fn open(&self, url: &str) -> Result<ReqwestBody, FetchError> {
    debug!(url = %url, "GET");
    let response = self.client.get(url).send().await.map_err(|e| FetchError::Network {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    let status = response.status();
    if status.is_success() {
      return Ok(ReqwestBody {
        url: url.to_string(),
        response,
      });
    }

    let quota = quota_from_headers(response.headers(), Utc::now());
    if is_rate_limited(status, &quota) {
      return Err(FetchError::RateLimited {
        url: url.to_string(),
        quota,
      });
    }

    Err(FetchError::Status {
      url: url.to_string(),
      status: status.as_u16(),
    })
  }
}

/// 429 always means rate limiting; 403 only when the quota header says it is exhausted.
fn is_rate_limited(status: StatusCode, quota: &RateLimitQuota) -> bool {
  status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && quota.remaining == Some(0))
}

fn quota_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> RateLimitQuota {
  let number = |name: &str| -> Option<u64> { headers.get(name)?.to_str().ok()?.trim().parse().ok() };

  let reset_at = number(RATELIMIT_RESET)
    .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
    .or_else(|| {
      let secs: i64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
      Some(now + chrono::Duration::seconds(secs))
    });

  RateLimitQuota {
    limit: number(RATELIMIT_LIMIT),
    remaining: number(RATELIMIT_REMAINING),
    reset_at,
  }
}
