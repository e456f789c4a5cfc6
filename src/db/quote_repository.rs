//! Quote request repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::format_timestamp;
use crate::models::Quote;

pub struct QuoteRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> QuoteRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, quote: &Quote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quotes (id, name, email, origin, destination, details, department, consent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(quote.id.to_string())
        .bind(&quote.name)
        .bind(&quote.email)
        .bind(&quote.origin)
        .bind(&quote.destination)
        .bind(&quote.details)
        .bind(quote.department.as_str())
        .bind(quote.consent)
        .bind(format_timestamp(quote.created_at))
        .execute(self.pool)
        .await
        .context("Failed to store quote request")?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM quotes")
            .fetch_one(self.pool)
            .await
            .context("Failed to count quotes")
    }
}
