//! Update command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, listing};

#[test]
fn update_replaces_stale_file_and_keeps_backup() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "X");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "Y")]))
    .create();
  let download = server.mock("GET", "/files/a.dll").with_body("Y").expect(1).create();

  env
    .upkeep_cmd()
    .args(["update", "--yes"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Updated 1 file(s)"));

  assert_eq!(env.read_file("a.dll"), "Y");
  assert_eq!(env.read_file("a.dll.bak"), "X");
  download.assert();
}

#[test]
fn update_creates_missing_nested_file() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("plugins/b.dll", "B")]))
    .create();
  server.mock("GET", "/files/plugins/b.dll").with_body("B").create();

  env.upkeep_cmd().args(["update", "--yes"]).assert().success();

  assert_eq!(env.read_file("plugins/b.dll"), "B");
  assert!(!env.install_dir().join("plugins/b.dll.bak").exists());
}

#[test]
fn update_without_yes_fails_non_interactively() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "X");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "Y")]))
    .create();
  let download = server.mock("GET", "/files/a.dll").expect(0).create();

  env
    .upkeep_cmd()
    .arg("update")
    .assert()
    .failure()
    .stderr(predicate::str::contains("--yes"));

  assert_eq!(env.read_file("a.dll"), "X");
  download.assert();
}

#[test]
fn update_when_up_to_date_downloads_nothing() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "A");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "A")]))
    .create();
  let download = server.mock("GET", "/files/a.dll").expect(0).create();

  env
    .upkeep_cmd()
    .args(["update", "--yes"])
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));

  download.assert();
}

#[test]
fn update_fails_when_download_keeps_failing() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "X");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "Y")]))
    .create();
  server.mock("GET", "/files/a.dll").with_status(500).expect(2).create();

  env
    .upkeep_cmd()
    .args(["update", "--yes"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("a.dll"));

  assert_eq!(env.read_file("a.dll"), "X");
}
