//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Test application setup on a throwaway SQLite file
//! - Seeded workers with ready-made session tokens
//! - A recording mailer

#![allow(dead_code)]

pub mod test_app;

pub use fixtures::*;
pub use mocks::*;
pub use test_app::*;
