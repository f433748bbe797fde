mod common;

mod cache_tests;
mod check_tests;
mod update_tests;
mod versions_tests;
