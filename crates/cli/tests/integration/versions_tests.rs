//! Versions command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const VERSIONS: &str = r#"{
  "current": "1.1.0",
  "versions": [
    { "version": "1.1.0", "releaseDate": "2024-06-01", "notes": "Faster startup" },
    { "version": "1.0.0", "releaseDate": "2024-01-15", "notes": "" }
  ]
}"#;

#[test]
fn versions_lists_published_versions() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  server.mock("GET", "/api/version").with_body(VERSIONS).create();

  env
    .upkeep_cmd()
    .args(["versions", "--verbose"])
    .assert()
    .success()
    .stdout(predicate::str::contains("1.1.0 (2024-06-01)"))
    .stdout(predicate::str::contains("Faster startup"));
}

#[test]
fn versions_as_json() {
  let mut server = mockito::Server::new();
  let env = TestEnv::with_backend(&server.url());
  server.mock("GET", "/api/version").with_body(VERSIONS).create();

  let output = env.upkeep_cmd().args(["-o", "json", "versions"]).output().unwrap();
  assert!(output.status.success());

  let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(info["current"], "1.1.0");
  assert_eq!(info["versions"].as_array().unwrap().len(), 2);
}
