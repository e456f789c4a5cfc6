//! Database layer
//!
//! SQLite storage for shipments, their checkpoints, the audit trail,
//! worker accounts and quote requests.

pub mod audit_repository;
pub mod migrations;
pub mod quote_repository;
pub mod shipment_repository;

use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::config::DatabaseConfig;

pub use audit_repository::AuditRepository;
pub use quote_repository::QuoteRepository;
pub use shipment_repository::ShipmentRepository;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and run pending migrations
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", config.url))?;

    migrations::run(&pool).await?;

    Ok(pool)
}

/// Current time at the precision timestamps are stored with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Storage form: RFC 3339, UTC, millisecond precision, so text order is time order
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    tracing::warn!(value = ts, "Unparseable timestamp in database");
    DateTime::<Utc>::UNIX_EPOCH
}
