//! Shipment repository
//!
//! Shipments and their append-only checkpoints. Identifier comparisons are
//! case-insensitive through the `NOCASE` collation on `tracking_id`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{format_timestamp, parse_db_timestamp};
use crate::models::{
    Checkpoint, CheckpointStatus, FieldValue, Shipment, ShipmentField, ShipmentFilter,
};
use crate::utils::validation::escape_like;

const SHIPMENT_COLUMNS: &str = "tracking_id, sender, receiver, phone, origin, destination, cargo, \
     weight, vehicle, driver, count, shipment_type, last_client_ping_at, created_at, updated_at";

/// Columns matched by the free-text listing filter
const SEARCHABLE_COLUMNS: [&str; 5] = ["tracking_id", "origin", "destination", "driver", "vehicle"];

#[derive(Debug, sqlx::FromRow)]
struct ShipmentRow {
    tracking_id: String,
    sender: Option<String>,
    receiver: Option<String>,
    phone: Option<String>,
    origin: Option<String>,
    destination: Option<String>,
    cargo: Option<String>,
    weight: Option<String>,
    vehicle: Option<String>,
    driver: Option<String>,
    count: i64,
    shipment_type: Option<String>,
    last_client_ping_at: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    at: String,
    text: String,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    shipment: ShipmentRow,
    last_status: Option<String>,
    last_status_at: Option<String>,
}

/// A shipment without its checkpoints, plus its latest checkpoint by timestamp
#[derive(Debug, Clone)]
pub struct ListedShipment {
    /// `checkpoints` is always empty here
    pub shipment: Shipment,
    pub last_status: Option<CheckpointStatus>,
    pub last_status_at: Option<DateTime<Utc>>,
}

pub struct ShipmentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ShipmentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, tracking_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM shipments WHERE tracking_id = ?")
                .bind(tracking_id)
                .fetch_optional(self.pool)
                .await
                .context("Failed to check shipment id")?;
        Ok(found.is_some())
    }

    /// Insert a shipment with its initial checkpoints
    ///
    /// Returns `false` when the identifier is already taken.
    pub async fn insert(&self, shipment: &Shipment) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO shipments (tracking_id, sender, receiver, phone, origin, destination, cargo,
                                   weight, vehicle, driver, count, shipment_type, last_client_ping_at,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&shipment.tracking_id)
        .bind(&shipment.sender)
        .bind(&shipment.receiver)
        .bind(&shipment.phone)
        .bind(&shipment.origin)
        .bind(&shipment.destination)
        .bind(&shipment.cargo)
        .bind(&shipment.weight)
        .bind(&shipment.vehicle)
        .bind(&shipment.driver)
        .bind(shipment.count)
        .bind(&shipment.shipment_type)
        .bind(shipment.last_client_ping_at.map(format_timestamp))
        .bind(format_timestamp(shipment.created_at))
        .bind(format_timestamp(shipment.updated_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Ok(false);
            }
            Err(e) => return Err(e).context("Failed to insert shipment"),
        }

        for checkpoint in &shipment.checkpoints {
            sqlx::query("INSERT INTO checkpoints (tracking_id, at, text, status) VALUES (?, ?, ?, ?)")
                .bind(&shipment.tracking_id)
                .bind(format_timestamp(checkpoint.at))
                .bind(&checkpoint.text)
                .bind(checkpoint.status.as_str())
                .execute(&mut *tx)
                .await
                .context("Failed to insert checkpoint")?;
        }

        tx.commit().await.context("Failed to commit shipment")?;
        Ok(true)
    }

    /// Fetch a shipment with its checkpoints in insertion order
    pub async fn get(&self, tracking_id: &str) -> Result<Option<Shipment>> {
        let sql = format!("SELECT {} FROM shipments WHERE tracking_id = ?", SHIPMENT_COLUMNS);
        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(tracking_id)
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch shipment")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let checkpoints = sqlx::query_as::<_, CheckpointRow>(
            "SELECT at, text, status FROM checkpoints WHERE tracking_id = ? ORDER BY seq",
        )
        .bind(&row.tracking_id)
        .fetch_all(self.pool)
        .await
        .context("Failed to fetch checkpoints")?
        .into_iter()
        .map(row_to_checkpoint)
        .collect::<Result<Vec<_>>>()?;

        let mut shipment = row_to_shipment(row);
        shipment.checkpoints = checkpoints;
        Ok(Some(shipment))
    }

    /// Append one checkpoint and bump `updated_at`
    ///
    /// Returns `false` when the shipment does not exist; nothing is written then.
    pub async fn append_checkpoint(
        &self,
        tracking_id: &str,
        checkpoint: &Checkpoint,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO checkpoints (tracking_id, at, text, status)
            SELECT tracking_id, ?, ?, ? FROM shipments WHERE tracking_id = ?
            "#,
        )
        .bind(format_timestamp(checkpoint.at))
        .bind(&checkpoint.text)
        .bind(checkpoint.status.as_str())
        .bind(tracking_id)
        .execute(&mut *tx)
        .await
        .context("Failed to append checkpoint")?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE shipments SET updated_at = ? WHERE tracking_id = ?")
            .bind(format_timestamp(updated_at))
            .bind(tracking_id)
            .execute(&mut *tx)
            .await
            .context("Failed to touch shipment")?;

        tx.commit().await.context("Failed to commit checkpoint")?;
        Ok(true)
    }

    /// Write the given field values in a single statement
    ///
    /// Returns `false` when no row matched.
    pub async fn apply_changes(
        &self,
        tracking_id: &str,
        values: &[(ShipmentField, FieldValue)],
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let assignments: Vec<String> = values
            .iter()
            .map(|(field, _)| format!("{} = ?", field.column()))
            .chain(std::iter::once("updated_at = ?".to_string()))
            .collect();
        let sql = format!(
            "UPDATE shipments SET {} WHERE tracking_id = ?",
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in values {
            query = match value {
                FieldValue::Text(text) => query.bind(text.clone()),
                FieldValue::Number(n) => query.bind(*n),
            };
        }

        let result = query
            .bind(format_timestamp(updated_at))
            .bind(tracking_id)
            .execute(self.pool)
            .await
            .context("Failed to update shipment")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_client_ping(&self, tracking_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE shipments SET last_client_ping_at = ? WHERE tracking_id = ?")
            .bind(format_timestamp(at))
            .bind(tracking_id)
            .execute(self.pool)
            .await
            .context("Failed to record client ping")?;
        Ok(result.rows_affected() > 0)
    }

    /// Shipments matching the filter, most recently updated first
    pub async fn search(
        &self,
        filter: &ShipmentFilter,
        limit: Option<u32>,
    ) -> Result<Vec<ListedShipment>> {
        let latest = |column: &str| {
            format!(
                "(SELECT c.{} FROM checkpoints c WHERE c.tracking_id = s.tracking_id \
                 ORDER BY c.at DESC, c.seq DESC LIMIT 1)",
                column
            )
        };

        let mut sql = format!(
            "SELECT * FROM (SELECT s.*, {} AS last_status, {} AS last_status_at FROM shipments s) AS listing \
             WHERE 1 = 1",
            latest("status"),
            latest("at"),
        );

        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        if pattern.is_some() {
            let clauses: Vec<String> = SEARCHABLE_COLUMNS
                .iter()
                .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
                .collect();
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
        if filter.status.is_some() {
            sql.push_str(" AND last_status = ?");
        }

        sql.push_str(" ORDER BY updated_at DESC, tracking_id ASC");
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, ListingRow>(&sql);
        if let Some(ref pattern) = pattern {
            for _ in SEARCHABLE_COLUMNS {
                query = query.bind(pattern);
            }
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }

        let rows = query
            .fetch_all(self.pool)
            .await
            .context("Failed to list shipments")?;

        rows.into_iter()
            .map(|row| {
                let last_status = row
                    .last_status
                    .as_deref()
                    .map(|s| s.parse::<CheckpointStatus>().map_err(anyhow::Error::msg))
                    .transpose()?;
                Ok(ListedShipment {
                    shipment: row_to_shipment(row.shipment),
                    last_status,
                    last_status_at: row.last_status_at.as_deref().map(parse_db_timestamp),
                })
            })
            .collect()
    }
}

fn row_to_shipment(row: ShipmentRow) -> Shipment {
    Shipment {
        tracking_id: row.tracking_id,
        sender: row.sender,
        receiver: row.receiver,
        phone: row.phone,
        origin: row.origin,
        destination: row.destination,
        cargo: row.cargo,
        weight: row.weight,
        vehicle: row.vehicle,
        driver: row.driver,
        count: row.count,
        shipment_type: row.shipment_type,
        checkpoints: Vec::new(),
        last_client_ping_at: row.last_client_ping_at.as_deref().map(parse_db_timestamp),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    }
}

fn row_to_checkpoint(row: CheckpointRow) -> Result<Checkpoint> {
    let status = row
        .status
        .parse::<CheckpointStatus>()
        .map_err(anyhow::Error::msg)?;
    Ok(Checkpoint {
        at: parse_db_timestamp(&row.at),
        text: row.text,
        status,
    })
}
