//! Check command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, listing};

#[test]
fn check_reports_up_to_date() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "A");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "A")]))
    .create();

  env
    .upkeep_cmd()
    .arg("check")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
}

#[test]
fn check_reports_stale_files_as_json() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "X");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "Y"), ("b.dll", "BB")]))
    .create();

  let output = env.upkeep_cmd().args(["-o", "json", "check"]).output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["status"], "update-available");
  assert_eq!(report["files"], 2);
  assert_eq!(report["bytes"], 3);
  assert_eq!(report["source"], "remote");
}

#[test]
fn check_reports_version_upgrade() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());

  server
    .mock("GET", "/api/files")
    .with_body(listing("2.0.0", &[("a.dll", "A")]))
    .create();

  env
    .upkeep_cmd()
    .arg("check")
    .assert()
    .success()
    .stderr(predicate::str::contains("Version 2.0.0 is available"));
}

#[test]
fn check_fails_when_backend_unreachable() {
  let env = TestEnv::with_backend("http://127.0.0.1:9");

  env.upkeep_cmd().arg("check").assert().failure().code(1);
}

#[test]
fn second_check_uses_cache() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "A");

  let files = server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "A")]))
    .expect(1)
    .create();

  env.upkeep_cmd().arg("check").assert().success();
  env
    .upkeep_cmd()
    .args(["-o", "json", "check"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"cache\""));

  files.assert();
}
