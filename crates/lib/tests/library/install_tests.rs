//! Bulk package installation over real HTTP.

use std::fs;
use std::io::{Cursor, Write};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use upkeep_lib::install::ArchiveFormat;
use upkeep_lib::manifest::ManifestSource;
use upkeep_lib::update::{ApplyOutcome, CycleResult, UpdateState, Updater};

use super::common::{config, transport};

fn package(files: &[(&str, &str)]) -> Vec<u8> {
  let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
  let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
  for (name, data) in files {
    writer.start_file(*name, options).unwrap();
    writer.write_all(data.as_bytes()).unwrap();
  }
  writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn installs_latest_package_with_backup() {
  let mut server = mockito::Server::new_async().await;
  let temp = TempDir::new().unwrap();
  let install_dir = temp.path().join("launcher");
  let backups = temp.path().join("backups");
  fs::create_dir_all(&install_dir).unwrap();
  fs::write(install_dir.join("app.exe"), "v1").unwrap();

  let latest = server
    .mock("GET", "/api/latest")
    .with_header("content-type", "application/octet-stream")
    .with_body(package(&[("app.exe", "v2"), ("lib/core.dll", "core")]))
    .expect(1)
    .create_async()
    .await;

  let mut settings = config(&install_dir, "1.0.0");
  settings.backup_dir = backups.clone();
  let updater = Updater::new(transport(), ManifestSource::backend(server.url()), settings);

  let outcome = updater
    .install_package(&upkeep_lib::progress::NoProgress, &CancellationToken::new())
    .await
    .unwrap();

  let ApplyOutcome::Installed { package, .. } = outcome else {
    panic!("expected an install outcome");
  };
  assert_eq!(package.format, ArchiveFormat::Zip);
  assert_eq!(package.files, 2);
  assert_eq!(fs::read_to_string(install_dir.join("app.exe")).unwrap(), "v2");
  assert_eq!(fs::read_to_string(package.backup.unwrap().join("app.exe")).unwrap(), "v1");
  assert_eq!(updater.state(), UpdateState::Idle(Some(CycleResult::Succeeded)));
  latest.assert_async().await;
}
