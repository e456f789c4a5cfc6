//! Audit log repository
//!
//! Append and read only; the schema rejects updates and deletes.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_timestamp, now, parse_db_timestamp};
use crate::models::{AuditActor, AuditKind, AuditLogEntry, NewAuditEntry};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    kind: String,
    tracking_id: String,
    actor_id: Option<String>,
    actor_email: String,
    actor_name: String,
    actor_role: String,
    changes: String,
    note: Option<String>,
    created_at: String,
}

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        let id = Uuid::new_v4();
        let created_at = now();
        let changes =
            serde_json::to_string(&entry.changes).context("Failed to encode audit changes")?;

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, kind, tracking_id, actor_id, actor_email, actor_name, actor_role, changes, note, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(entry.kind.as_str())
        .bind(&entry.tracking_id)
        .bind(entry.actor.id.map(|u| u.to_string()))
        .bind(&entry.actor.email)
        .bind(&entry.actor.name)
        .bind(&entry.actor.role)
        .bind(&changes)
        .bind(&entry.note)
        .bind(format_timestamp(created_at))
        .execute(self.pool)
        .await
        .context("Failed to insert audit log entry")?;

        Ok(AuditLogEntry {
            id,
            kind: entry.kind,
            tracking_id: entry.tracking_id,
            actor: entry.actor,
            changes: entry.changes,
            note: entry.note,
            created_at,
        })
    }

    /// Entries for one shipment, newest first; equal timestamps keep reverse insertion order
    pub async fn list_for_shipment(&self, tracking_id: &str, limit: u32) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, kind, tracking_id, actor_id, actor_email, actor_name, actor_role, changes, note, created_at
            FROM audit_log
            WHERE tracking_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(tracking_id)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await
        .context("Failed to list audit log")?;

        rows.into_iter().map(row_to_audit).collect()
    }
}

fn row_to_audit(row: AuditRow) -> Result<AuditLogEntry> {
    let kind = row.kind.parse::<AuditKind>().map_err(anyhow::Error::msg)?;
    let changes = serde_json::from_str(&row.changes)
        .with_context(|| format!("Corrupt changes in audit entry {}", row.id))?;

    Ok(AuditLogEntry {
        id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
        kind,
        tracking_id: row.tracking_id,
        actor: AuditActor {
            id: row.actor_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
            email: row.actor_email,
            name: row.actor_name,
            role: row.actor_role,
        },
        changes,
        note: row.note,
        created_at: parse_db_timestamp(&row.created_at),
    })
}
