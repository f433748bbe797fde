//! Test utilities for upkeep-lib.
//!
//! Provides a scripted [`HttpTransport`] that records every URL it is asked to open, so tests
//! can assert on retry budgets and on which transport route served a file.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::transport::{FetchError, HttpTransport, RateLimitQuota, ResponseBody};

/// A scripted response.
#[derive(Debug, Clone)]
pub enum Reply {
  /// A successful body delivered in the given chunks.
  Body {
    chunks: Vec<Vec<u8>>,
    content_length: Option<u64>,
  },
  /// A non-success status.
  Status(u16),
  /// Quota exhaustion.
  RateLimited,
  /// Connection failure.
  Network,
  /// A body that fails after delivering `chunks`.
  Truncated { chunks: Vec<Vec<u8>> },
}

impl Reply {
  pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
    let data = data.into();
    Reply::Body {
      content_length: Some(data.len() as u64),
      chunks: vec![data],
    }
  }

  pub fn chunked(chunks: Vec<Vec<u8>>) -> Self {
    let len = chunks.iter().map(|c| c.len() as u64).sum();
    Reply::Body {
      chunks,
      content_length: Some(len),
    }
  }

  pub fn json(value: serde_json::Value) -> Self {
    Reply::bytes(serde_json::to_vec(&value).unwrap())
  }
}

/// Transport answering from per-URL scripts.
///
/// Replies pushed with [`FakeTransport::push`] are served once each, in order; a URL whose queue
/// is empty falls back to its [`FakeTransport::always`] reply, or fails with a network error.
#[derive(Debug, Default)]
pub struct FakeTransport {
  queued: Mutex<HashMap<String, VecDeque<Reply>>>,
  always: Mutex<HashMap<String, Reply>>,
  calls: Mutex<Vec<String>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, url: &str, reply: Reply) {
    self
      .queued
      .lock()
      .unwrap()
      .entry(url.to_string())
      .or_default()
      .push_back(reply);
  }

  pub fn always(&self, url: &str, reply: Reply) {
    self.always.lock().unwrap().insert(url.to_string(), reply);
  }

  /// Every URL opened so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  /// Number of opens whose URL starts with `prefix`.
  pub fn calls_to(&self, prefix: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|u| u.starts_with(prefix)).count()
  }

  fn next_reply(&self, url: &str) -> Option<Reply> {
    if let Some(reply) = self.queued.lock().unwrap().get_mut(url).and_then(|q| q.pop_front()) {
      return Some(reply);
    }
    self.always.lock().unwrap().get(url).cloned()
  }
}

/// Body produced by [`FakeTransport`].
#[derive(Debug)]
pub struct FakeBody {
  url: String,
  chunks: VecDeque<Vec<u8>>,
  content_length: Option<u64>,
  fail_at_end: bool,
}

impl ResponseBody for FakeBody {
  fn content_length(&self) -> Option<u64> {
    self.content_length
  }

  async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
    match self.chunks.pop_front() {
      Some(chunk) => Ok(Some(chunk)),
      None if self.fail_at_end => Err(FetchError::Network {
        url: self.url.clone(),
        message: "connection reset".to_string(),
      }),
      None => Ok(None),
    }
  }
}

impl HttpTransport for FakeTransport {
  type Body = FakeBody;

  async fn open(&self, url: &str) -> Result<FakeBody, FetchError> {
    self.calls.lock().unwrap().push(url.to_string());
    let url = url.to_string();

    match self.next_reply(&url) {
      Some(Reply::Body { chunks, content_length }) => Ok(FakeBody {
        url,
        chunks: chunks.into(),
        content_length,
        fail_at_end: false,
      }),
      Some(Reply::Truncated { chunks }) => Ok(FakeBody {
        url,
        content_length: Some(u64::MAX),
        chunks: chunks.into(),
        fail_at_end: true,
      }),
      Some(Reply::Status(status)) => Err(FetchError::Status { url, status }),
      Some(Reply::RateLimited) => Err(FetchError::RateLimited {
        url,
        quota: RateLimitQuota {
          limit: Some(60),
          remaining: Some(0),
          reset_at: None,
        },
      }),
      Some(Reply::Network) => Err(FetchError::Network {
        url,
        message: "connection refused".to_string(),
      }),
      None => Err(FetchError::Network {
        url,
        message: "no reply scripted".to_string(),
      }),
    }
  }
}
