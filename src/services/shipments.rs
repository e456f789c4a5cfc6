//! Shipment editor
//!
//! Every mutation of a shipment goes through here: creation, checkpoint
//! appends, role-scoped field edits, admin notes and client nudges. The role
//! policy is consulted before the store is touched.

use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::{rngs::OsRng, Rng};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::{self, AuditRepository, ShipmentRepository};
use crate::models::{
    Actor, AuditActor, AuditLogEntry, Checkpoint, CheckpointStatus, FieldChange, FieldValue,
    NewAuditEntry, NewCheckpoint, Shipment, ShipmentDetail, ShipmentDraft, ShipmentField,
    ShipmentPatch, UserRole,
};
use crate::services::mailer::{self, Mailer, OutboundEmail};
use crate::services::rbac;
use crate::utils::validation::non_blank;
use crate::utils::AppError;

pub const TRACKING_ID_PREFIX: &str = "TRZ";

const TRACKING_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TRACKING_ID_SUFFIX_LEN: usize = 6;

/// Re-rolls allowed before giving up on a free identifier
const MAX_ID_ATTEMPTS: usize = 8;

/// Clients may nudge only once the latest checkpoint is this old
const NUDGE_AFTER_HOURS: i64 = 24;

/// Minimum gap between two client nudges on the same shipment
const NUDGE_COOLDOWN_HOURS: i64 = 6;

const DEFAULT_SHIPMENT_TYPE: &str = "standard";

#[derive(Debug, Error)]
pub enum ShipmentError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("could not allocate a free tracking id")]
    IdExhausted,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<ShipmentError> for AppError {
    fn from(err: ShipmentError) -> Self {
        match err {
            ShipmentError::NotFound(msg) => AppError::NotFound(msg),
            ShipmentError::InvalidInput(msg) => AppError::invalid(msg),
            ShipmentError::Forbidden(msg) => AppError::Forbidden(msg),
            ShipmentError::IdExhausted => AppError::internal("could not allocate a free tracking id"),
            ShipmentError::Store(e) => AppError::Internal(format!("{:#}", e)),
        }
    }
}

/// Result of a role-scoped update
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub shipment: ShipmentDetail,
    pub changes: Vec<FieldChange>,
}

/// What happened to a client nudge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeOutcome {
    /// Workers were notified
    Sent,
    /// The latest checkpoint is recent enough
    TooSoon,
    /// Somebody already nudged within the cooldown
    RecentPing,
}

/// `TRZ-YYYYMMDD-XXXXXX` for the given creation time
pub fn generate_tracking_id<R: Rng>(created_at: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..TRACKING_ID_SUFFIX_LEN)
        .map(|_| TRACKING_ID_ALPHABET[rng.gen_range(0..TRACKING_ID_ALPHABET.len())] as char)
        .collect();
    format!(
        "{}-{}-{}",
        TRACKING_ID_PREFIX,
        created_at.format("%Y%m%d"),
        suffix
    )
}

/// Field changes a role may make, in field order
///
/// Fields the role cannot edit are ignored, as are fields whose stringified
/// value would not change (a missing value equals the empty string).
pub fn compute_changes(
    shipment: &Shipment,
    patch: &ShipmentPatch,
    role: UserRole,
) -> Vec<(ShipmentField, FieldValue, FieldValue)> {
    ShipmentField::ALL
        .into_iter()
        .filter(|field| rbac::can_edit(role, *field))
        .filter_map(|field| {
            let after = patch.get(field)?;
            let before = shipment.field_value(field);
            (before.stringify() != after.stringify()).then_some((field, before, after))
        })
        .collect()
}

fn clean_text(value: Option<String>) -> Option<String> {
    non_blank(value.as_deref()).map(str::to_string)
}

fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::milliseconds(1)).unwrap_or(at)
}

#[derive(Clone)]
pub struct ShipmentEditor {
    pool: SqlitePool,
    mailer: Arc<dyn Mailer>,
    workers_inbox: Option<String>,
}

impl ShipmentEditor {
    pub fn new(pool: SqlitePool, mailer: Arc<dyn Mailer>, workers_inbox: Option<String>) -> Self {
        Self {
            pool,
            mailer,
            workers_inbox,
        }
    }

    fn shipments(&self) -> ShipmentRepository<'_> {
        ShipmentRepository::new(&self.pool)
    }

    fn audit(&self) -> AuditRepository<'_> {
        AuditRepository::new(&self.pool)
    }

    async fn load(&self, tracking_id: &str) -> Result<Shipment, ShipmentError> {
        self.shipments()
            .get(tracking_id)
            .await?
            .ok_or_else(|| ShipmentError::NotFound(format!("shipment {} not found", tracking_id)))
    }

    /// Open a new shipment with a fresh identifier and its seed checkpoint
    pub async fn create(&self, actor: &Actor, draft: ShipmentDraft) -> Result<Shipment, ShipmentError> {
        if !rbac::can_create_shipments(actor.role) {
            return Err(ShipmentError::Forbidden(format!(
                "role {} cannot create shipments",
                actor.role
            )));
        }

        let now = db::now();
        let mut shipment = Shipment {
            tracking_id: String::new(),
            sender: clean_text(draft.sender),
            receiver: clean_text(draft.receiver),
            phone: clean_text(draft.phone),
            origin: clean_text(draft.origin),
            destination: clean_text(draft.destination),
            cargo: clean_text(draft.cargo),
            weight: clean_text(draft.weight),
            vehicle: clean_text(draft.vehicle),
            driver: clean_text(draft.driver),
            count: draft.count.unwrap_or(1),
            shipment_type: clean_text(draft.shipment_type)
                .or_else(|| Some(DEFAULT_SHIPMENT_TYPE.to_string())),
            checkpoints: vec![Checkpoint::seed(now)],
            last_client_ping_at: None,
            created_at: now,
            updated_at: now,
        };

        let repo = self.shipments();
        let mut stored = false;
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = generate_tracking_id(now, &mut OsRng);
            if repo.exists(&candidate).await? {
                continue;
            }
            shipment.tracking_id = candidate;
            // The primary key still catches a race between the check and the insert
            if repo.insert(&shipment).await? {
                stored = true;
                break;
            }
        }
        if !stored {
            return Err(ShipmentError::IdExhausted);
        }

        info!(
            tracking_id = %shipment.tracking_id,
            actor = %actor.email,
            "Shipment created"
        );

        if let Err(e) = self
            .audit()
            .append(NewAuditEntry::create(&shipment.tracking_id, AuditActor::from(actor)))
            .await
        {
            error!(
                tracking_id = %shipment.tracking_id,
                error = %format!("{:#}", e),
                "Failed to write creation audit entry"
            );
        }

        Ok(shipment)
    }

    /// Append a checkpoint; earlier checkpoints are never touched
    pub async fn append_checkpoint(
        &self,
        actor: &Actor,
        tracking_id: &str,
        input: NewCheckpoint,
    ) -> Result<Checkpoint, ShipmentError> {
        let status: CheckpointStatus = input
            .status
            .trim()
            .parse()
            .map_err(|_| ShipmentError::InvalidInput("invalid status".to_string()))?;

        let note = non_blank(input.note.as_deref()).unwrap_or(status.as_str());
        let text = match non_blank(input.location.as_deref()) {
            Some(location) => format!("{} - {}", note, location),
            None => note.to_string(),
        };

        let now = db::now();
        let at = input.at.map(truncate_millis).unwrap_or(now);
        let checkpoint = Checkpoint::new(at, text, status);

        if !self
            .shipments()
            .append_checkpoint(tracking_id, &checkpoint, now)
            .await?
        {
            return Err(ShipmentError::NotFound(format!(
                "shipment {} not found",
                tracking_id
            )));
        }

        info!(
            tracking_id = %tracking_id,
            actor = %actor.email,
            status = %status,
            "Checkpoint appended"
        );

        Ok(checkpoint)
    }

    /// Apply the fields of `patch` the actor's role may edit
    pub async fn update(
        &self,
        actor: &Actor,
        tracking_id: &str,
        patch: ShipmentPatch,
    ) -> Result<UpdateOutcome, ShipmentError> {
        let shipment = self.load(tracking_id).await?;

        if rbac::editable_fields(actor.role).is_empty() {
            return Err(ShipmentError::Forbidden(format!(
                "role {} cannot edit shipments",
                actor.role
            )));
        }

        let diffs = compute_changes(&shipment, &patch, actor.role);
        if diffs.is_empty() {
            return Ok(UpdateOutcome {
                shipment: ShipmentDetail::from_shipment(shipment, db::now()),
                changes: Vec::new(),
            });
        }

        let values: Vec<(ShipmentField, FieldValue)> = diffs
            .iter()
            .map(|(field, _, after)| (*field, after.clone()))
            .collect();
        let changes: Vec<FieldChange> = diffs
            .iter()
            .map(|(field, before, after)| FieldChange {
                field: *field,
                before: before.to_json(),
                after: after.to_json(),
            })
            .collect();

        let id = shipment.tracking_id.clone();
        if !self.shipments().apply_changes(&id, &values, db::now()).await? {
            return Err(ShipmentError::NotFound(format!("shipment {} not found", id)));
        }

        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
        info!(
            tracking_id = %id,
            actor = %actor.email,
            fields = ?fields,
            "Shipment updated"
        );

        // The update is already committed; a failed audit write is only logged
        if let Err(e) = self
            .audit()
            .append(NewAuditEntry::update(&id, AuditActor::from(actor), changes.clone()))
            .await
        {
            error!(
                tracking_id = %id,
                error = %format!("{:#}", e),
                "Failed to write update audit entry"
            );
        }

        let shipment = self.load(&id).await?;
        Ok(UpdateOutcome {
            shipment: ShipmentDetail::from_shipment(shipment, db::now()),
            changes,
        })
    }

    /// Record an administrative note, optionally emailing it to someone
    pub async fn admin_note(
        &self,
        actor: &Actor,
        tracking_id: &str,
        note: &str,
        notify_email: Option<&str>,
    ) -> Result<AuditLogEntry, ShipmentError> {
        if !rbac::can_add_admin_notes(actor.role) {
            return Err(ShipmentError::Forbidden(
                "only admin or it may add notes".to_string(),
            ));
        }

        let Some(note) = non_blank(Some(note)) else {
            return Err(ShipmentError::InvalidInput("note required".to_string()));
        };

        let shipment = self.load(tracking_id).await?;
        let entry = self
            .audit()
            .append(NewAuditEntry::admin_note(
                &shipment.tracking_id,
                AuditActor::from(actor),
                note,
            ))
            .await?;

        info!(
            tracking_id = %shipment.tracking_id,
            actor = %actor.email,
            "Admin note recorded"
        );

        if let Some(to) = non_blank(notify_email) {
            let email = OutboundEmail::new(
                to,
                format!("Correction on {}", shipment.tracking_id),
                note.to_string(),
            );
            mailer::dispatch(self.mailer.clone(), email, "admin_note");
        }

        Ok(entry)
    }

    /// Public request for workers to post an update on a quiet shipment
    pub async fn nudge(&self, tracking_id: &str) -> Result<NudgeOutcome, ShipmentError> {
        let shipment = self.load(tracking_id).await?;
        let now = db::now();

        if let Some(latest) = shipment.latest_checkpoint() {
            if now - latest.at < Duration::hours(NUDGE_AFTER_HOURS) {
                return Ok(NudgeOutcome::TooSoon);
            }
        }
        if let Some(pinged) = shipment.last_client_ping_at {
            if now - pinged < Duration::hours(NUDGE_COOLDOWN_HOURS) {
                return Ok(NudgeOutcome::RecentPing);
            }
        }

        self.shipments()
            .mark_client_ping(&shipment.tracking_id, now)
            .await?;

        info!(tracking_id = %shipment.tracking_id, "Client requested an update");

        match self.workers_inbox.as_deref() {
            Some(inbox) => {
                let email = OutboundEmail::new(
                    inbox,
                    format!("Client ping on {} - update requested", shipment.tracking_id),
                    nudge_body(&shipment),
                );
                mailer::dispatch(self.mailer.clone(), email, "nudge");
            }
            None => warn!(
                tracking_id = %shipment.tracking_id,
                "No workers inbox configured, nudge not mailed"
            ),
        }

        Ok(NudgeOutcome::Sent)
    }
}

fn nudge_body(shipment: &Shipment) -> String {
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let last = shipment
        .latest_checkpoint()
        .map(|c| format!("{} ({})", c.text, db::format_timestamp(c.at)))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "A client asked for an update on shipment {}.\n\n\
         Route: {} -> {}\n\
         Driver: {}\n\
         Vehicle: {}\n\
         Last checkpoint: {}\n",
        shipment.tracking_id,
        or_dash(&shipment.origin),
        or_dash(&shipment.destination),
        or_dash(&shipment.driver),
        or_dash(&shipment.vehicle),
        last,
    )
}
