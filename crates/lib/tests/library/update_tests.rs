//! End-to-end update cycles.

use std::fs;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use upkeep_lib::manifest::{ManifestError, ManifestSource, RepositorySource};
use upkeep_lib::progress::NoProgress;
use upkeep_lib::update::{ApplyOutcome, CheckOutcome, CycleResult, ManifestOrigin, UpdateError, UpdateState, Updater};
use upkeep_lib::util::hash::blob_hash_bytes;

use super::common::{config, listing, transport};

#[tokio::test]
async fn stale_file_is_replaced_and_backed_up() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();
  fs::write(temp.path().join("a.dll"), "X").unwrap();

  let files = server
    .mock("GET", "/api/files")
    .with_header("content-type", "application/json")
    .with_body(listing("1.0.0", &[("a.dll", "Y")]))
    .create_async()
    .await;
  let download = server
    .mock("GET", "/files/a.dll")
    .with_body("Y")
    .expect(1)
    .create_async()
    .await;

  let updater = Updater::new(
    transport(),
    ManifestSource::backend(server.url()),
    config(temp.path(), "1.0.0"),
  );

  let report = updater.check(&NoProgress).await.unwrap();
  assert_eq!(report.outcome, CheckOutcome::UpdateAvailable { files: 1, bytes: 1 });

  let outcome = updater.apply(&NoProgress, &CancellationToken::new()).await.unwrap();
  assert!(matches!(outcome, ApplyOutcome::Updated { files: 1, .. }));

  assert_eq!(fs::read_to_string(temp.path().join("a.dll")).unwrap(), "Y");
  assert_eq!(fs::read_to_string(temp.path().join("a.dll.bak")).unwrap(), "X");
  files.assert_async().await;
  download.assert_async().await;
}

#[tokio::test]
async fn version_mismatch_requires_full_upgrade() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.1", &[("a.dll", "Y")]))
    .create_async()
    .await;
  let download = server.mock("GET", "/files/a.dll").expect(0).create_async().await;

  let updater = Updater::new(
    transport(),
    ManifestSource::backend(server.url()),
    config(temp.path(), "1.0.0"),
  );

  let report = updater.check(&NoProgress).await.unwrap();
  assert_eq!(
    report.outcome,
    CheckOutcome::FullUpgradeRequired {
      available: "1.0.1".to_string()
    }
  );
  assert!(matches!(updater.state(), UpdateState::Idle(_)));
  download.assert_async().await;
}

#[tokio::test]
async fn unreachable_backend_without_cache_fails() {
  let temp = TempDir::new().unwrap();
  let updater = Updater::new(
    transport(),
    ManifestSource::backend("http://127.0.0.1:9"),
    config(temp.path(), "1.0.0"),
  );

  let err = updater.check(&NoProgress).await.unwrap_err();
  assert!(matches!(err, UpdateError::Manifest(ManifestError::Network(_))));
  assert!(matches!(updater.state(), UpdateState::Idle(Some(CycleResult::Failed(_)))));
  assert!(updater.last_checked().is_none());
}

#[tokio::test]
async fn checking_after_an_update_finds_nothing() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();

  let files = server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "A"), ("lib/b.dll", "B")]))
    .expect(2)
    .create_async()
    .await;
  server.mock("GET", "/files/a.dll").with_body("A").create_async().await;
  server.mock("GET", "/files/lib/b.dll").with_body("B").create_async().await;

  let updater = Updater::new(
    transport(),
    ManifestSource::backend(server.url()),
    config(temp.path(), "1.0.0"),
  );

  updater.check(&NoProgress).await.unwrap();
  updater.apply(&NoProgress, &CancellationToken::new()).await.unwrap();

  // The update invalidated the cache, so this goes back to the server.
  let report = updater.check(&NoProgress).await.unwrap();
  assert_eq!(report.origin, ManifestOrigin::Remote);
  assert_eq!(report.outcome, CheckOutcome::UpToDate);
  files.assert_async().await;
}

#[tokio::test]
async fn repository_listing_drives_an_update() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();

  let body = serde_json::json!([
    {
      "name": "a.txt",
      "path": "dist/a.txt",
      "sha": blob_hash_bytes(b"hello world").to_string(),
      "size": 11,
      "type": "file",
      "download_url": format!("{}/raw/dist/a.txt", server.url())
    },
    {
      "name": "docs",
      "path": "dist/docs",
      "sha": "0000000000000000000000000000000000000000",
      "size": 0,
      "type": "dir",
      "download_url": null
    }
  ]);
  server
    .mock("GET", "/repos/acme/launcher/contents/dist")
    .match_query(mockito::Matcher::UrlEncoded("ref".into(), "main".into()))
    .with_body(body.to_string())
    .create_async()
    .await;
  server
    .mock("GET", "/raw/dist/a.txt")
    .with_body("hello world")
    .create_async()
    .await;

  let source = ManifestSource::Repository(RepositorySource {
    path: "dist".to_string(),
    api_url: server.url(),
    raw_url: format!("{}/raw", server.url()),
    ..RepositorySource::new("acme", "launcher")
  });
  let updater = Updater::new(transport(), source, config(temp.path(), "ignored"));

  let report = updater.check(&NoProgress).await.unwrap();
  assert_eq!(report.version, None);
  assert_eq!(report.outcome, CheckOutcome::UpdateAvailable { files: 1, bytes: 11 });

  updater.apply(&NoProgress, &CancellationToken::new()).await.unwrap();
  assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hello world");
  assert!(!temp.path().join("docs").exists());
}
