//! Cache command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, listing};

#[test]
fn cache_show_after_check() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  env.write_file("a.dll", "A");

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "A")]))
    .create();

  env.upkeep_cmd().arg("check").assert().success();

  env
    .upkeep_cmd()
    .args(["cache", "show"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cached manifest is fresh"))
    .stdout(predicate::str::contains("1.0.0"));
}

#[test]
fn cache_clear_removes_record() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());

  server
    .mock("GET", "/api/files")
    .with_body(listing("1.0.0", &[("a.dll", "A")]))
    .create();

  env.upkeep_cmd().arg("check").assert().success();
  env.upkeep_cmd().args(["cache", "clear"]).assert().success();

  env
    .upkeep_cmd()
    .args(["cache", "show"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No cached manifest"));
}
