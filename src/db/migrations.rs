//! Database migrations
//!
//! Migrations are handled by SQLx and stored in the `migrations/` directory.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Tables the service cannot run without
pub const REQUIRED_TABLES: [&str; 5] = ["users", "shipments", "checkpoints", "audit_log", "quotes"];

pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")
}

/// Required tables that are missing from the schema
pub async fn missing_tables(pool: &SqlitePool) -> Result<Vec<&'static str>> {
    let present: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(pool)
            .await
            .context("Failed to read sqlite_master")?;

    Ok(REQUIRED_TABLES
        .into_iter()
        .filter(|table| !present.iter().any(|p| p == table))
        .collect())
}

/// Readiness probe
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}
