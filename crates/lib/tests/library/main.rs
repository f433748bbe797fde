//! Library integration tests against a mock HTTP server.

mod common;
mod fetch_tests;
mod install_tests;
mod update_tests;
