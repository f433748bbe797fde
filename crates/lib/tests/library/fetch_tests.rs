//! Retry and fallback behavior over real HTTP.

use std::fs;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use upkeep_lib::fetch::{FileFetchError, FileFetcher, RetryPolicy};
use upkeep_lib::manifest::{ManifestEntry, ManifestSource};
use upkeep_lib::progress::NoProgress;
use upkeep_lib::util::hash::{DigestKind, FileDigest};

use super::common::transport;

fn entry(name: &str) -> ManifestEntry {
  ManifestEntry {
    name: name.to_string(),
    size: 1,
    digest: FileDigest::parse(DigestKind::Content, "00"),
    source_url: format!("/files/{}", name),
  }
}

#[tokio::test]
async fn failing_file_costs_exactly_three_requests() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();

  let failing = server
    .mock("GET", "/files/a.dll")
    .with_status(500)
    .expect(3)
    .create_async()
    .await;

  let fetcher = FileFetcher::new(transport(), ManifestSource::backend(server.url()), RetryPolicy::immediate(3));
  let err = fetcher
    .fetch_and_apply(&entry("a.dll"), temp.path(), &NoProgress, &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, FileFetchError::Network { attempts: 3, .. }));
  failing.assert_async().await;
}

#[tokio::test]
async fn rate_limit_moves_the_rest_of_the_cycle_to_the_fallback() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();

  let limited = server
    .mock("GET", "/files/a.dll")
    .with_status(403)
    .with_header("x-ratelimit-limit", "60")
    .with_header("x-ratelimit-remaining", "0")
    .expect(1)
    .create_async()
    .await;
  let primary_b = server.mock("GET", "/files/b.dll").expect(0).create_async().await;
  let mirror_a = server
    .mock("GET", "/mirror/a.dll")
    .with_body("A")
    .expect(1)
    .create_async()
    .await;
  let mirror_b = server
    .mock("GET", "/mirror/b.dll")
    .with_body("B")
    .expect(1)
    .create_async()
    .await;

  let source = ManifestSource::Backend {
    base_url: server.url(),
    fallback_url: Some(format!("{}/mirror", server.url())),
    digest: DigestKind::Content,
  };
  let fetcher = FileFetcher::new(transport(), source, RetryPolicy::immediate(3));
  let cancel = CancellationToken::new();

  fetcher
    .fetch_and_apply(&entry("a.dll"), temp.path(), &NoProgress, &cancel)
    .await
    .unwrap();
  fetcher
    .fetch_and_apply(&entry("b.dll"), temp.path(), &NoProgress, &cancel)
    .await
    .unwrap();

  assert!(fetcher.fallback_active());
  assert_eq!(fs::read_to_string(temp.path().join("b.dll")).unwrap(), "B");
  limited.assert_async().await;
  primary_b.assert_async().await;
  mirror_a.assert_async().await;
  mirror_b.assert_async().await;
}
