//! Integration tests for the brick CLI.

mod build_tests;
mod common;
mod deps_tests;
