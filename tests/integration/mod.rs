//! Integration tests for the Tretize portal
//!
//! These tests drive the full router (middleware included) against a
//! real SQLite file per test.

mod auth_tests;
mod shipments_api_tests;
