//! Audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::shipment::FieldChange;
use super::user::Actor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    TrackingUpdate,
    TrackingCreate,
    AdminNote,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::TrackingUpdate => "tracking_update",
            AuditKind::TrackingCreate => "tracking_create",
            AuditKind::AdminNote => "admin_note",
        }
    }
}

impl std::str::FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tracking_update" => Ok(AuditKind::TrackingUpdate),
            "tracking_create" => Ok(AuditKind::TrackingCreate),
            "admin_note" => Ok(AuditKind::AdminNote),
            _ => Err(format!("Invalid audit kind: {}", s)),
        }
    }
}

/// Who did it, copied at write time
///
/// The role is kept as text so entries written under a retired role stay readable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditActor {
    pub id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl From<&Actor> for AuditActor {
    fn from(actor: &Actor) -> Self {
        Self {
            id: Some(actor.id),
            email: actor.email.clone(),
            name: actor.label().to_string(),
            role: actor.role.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub kind: AuditKind,
    pub tracking_id: String,
    pub actor: AuditActor,
    pub changes: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry about to be appended
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub kind: AuditKind,
    pub tracking_id: String,
    pub actor: AuditActor,
    pub changes: Vec<FieldChange>,
    pub note: Option<String>,
}

impl NewAuditEntry {
    pub fn update(tracking_id: &str, actor: AuditActor, changes: Vec<FieldChange>) -> Self {
        Self {
            kind: AuditKind::TrackingUpdate,
            tracking_id: tracking_id.to_string(),
            actor,
            changes,
            note: None,
        }
    }

    pub fn create(tracking_id: &str, actor: AuditActor) -> Self {
        Self {
            kind: AuditKind::TrackingCreate,
            tracking_id: tracking_id.to_string(),
            actor,
            changes: Vec::new(),
            note: None,
        }
    }

    pub fn admin_note(tracking_id: &str, actor: AuditActor, note: &str) -> Self {
        Self {
            kind: AuditKind::AdminNote,
            tracking_id: tracking_id.to_string(),
            actor,
            changes: Vec::new(),
            note: Some(note.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub limit: Option<u32>,
}
