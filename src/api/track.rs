//! Tracking API endpoints
//!
//! Public lookup and nudge, plus the worker operations: listing, export,
//! creation, checkpoints, role-scoped edits, audit trail and admin notes.

use axum::{
    extract::{Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    db::AuditRepository,
    middleware::AuthUser,
    models::{
        AuditLogEntry, AuditLogQuery, CheckpointStatus, NewCheckpoint, ShipmentDetail,
        ShipmentDraft, ShipmentFilter, ShipmentPatch, ShipmentSummary,
    },
    services::{NudgeOutcome, UpdateOutcome},
    utils::{validation::non_blank, ApiResponse, AppError, AppResult},
    AppState,
};

const DEFAULT_AUDIT_LIMIT: u32 = 100;
const MAX_AUDIT_LIMIT: u32 = 500;

/// Lookup route anyone may call
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/{id}", get(lookup))
}

/// Client nudge; public, but sits behind the strict limiter
pub fn nudge_routes() -> Router<AppState> {
    Router::new().route("/{id}/nudge", post(nudge))
}

/// Worker routes (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_shipments).post(create_shipment))
        .route("/export", get(export_shipments))
        .route("/{id}", axum::routing::put(update_shipment))
        .route("/{id}/checkpoints", post(append_checkpoint))
        .route("/{id}/audit", get(audit_trail))
        .route("/{id}/admin-note", post(admin_note))
}

/// Listing and export query string; `status` is checked by hand so a bad
/// value gets the regular 400 envelope
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl ListQuery {
    fn filter(&self) -> AppResult<ShipmentFilter> {
        let status = non_blank(self.status.as_deref())
            .map(|s| s.to_lowercase().parse::<CheckpointStatus>())
            .transpose()
            .map_err(|_| AppError::invalid_fields("invalid status", vec!["status".to_string()]))?;

        Ok(ShipmentFilter {
            q: non_blank(self.q.as_deref()).map(str::to_string),
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNoteRequest {
    #[serde(default)]
    pub note: String,
    #[serde(alias = "email")]
    pub to_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NudgeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<NudgeOutcome> for NudgeResponse {
    fn from(outcome: NudgeOutcome) -> Self {
        let reason = match outcome {
            NudgeOutcome::Sent => None,
            NudgeOutcome::TooSoon => Some("too_soon"),
            NudgeOutcome::RecentPing => Some("recent_ping"),
        };
        Self {
            ok: reason.is_none(),
            reason,
        }
    }
}

/// GET /api/track/{id}
async fn lookup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<ShipmentDetail>> {
    let detail = state.finder.find_by_id(&id).await?;
    Ok(ApiResponse::data(detail))
}

/// POST /api/track/{id}/nudge
async fn nudge(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<NudgeResponse>> {
    let outcome = state.editor.nudge(id.trim()).await?;
    Ok(Json(outcome.into()))
}

/// GET /api/track
async fn list_shipments(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<ShipmentSummary>>> {
    let rows = state.finder.list(&query.filter()?, query.limit).await?;
    Ok(ApiResponse::data(rows))
}

/// GET /api/track/export
async fn export_shipments(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let csv = state.finder.export_csv(&query.filter()?).await?;
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"shipments.csv\""),
        ],
        csv,
    ))
}

/// POST /api/track
async fn create_shipment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(draft): Json<ShipmentDraft>,
) -> AppResult<ApiResponse<ShipmentDetail>> {
    draft.validate()?;
    let shipment = state.editor.create(&auth_user.actor(), draft).await?;
    let detail = ShipmentDetail::from_shipment(shipment, crate::db::now());
    Ok(ApiResponse::data(detail).with_message("shipment created"))
}

/// PUT /api/track/{id}
async fn update_shipment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ShipmentPatch>,
) -> AppResult<ApiResponse<UpdateOutcome>> {
    patch.validate()?;
    let outcome = state
        .editor
        .update(&auth_user.actor(), id.trim(), patch)
        .await?;
    Ok(ApiResponse::data(outcome))
}

/// POST /api/track/{id}/checkpoints
async fn append_checkpoint(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<NewCheckpoint>,
) -> AppResult<ApiResponse<ShipmentDetail>> {
    let id = id.trim();
    state
        .editor
        .append_checkpoint(&auth_user.actor(), id, input)
        .await?;
    let detail = state.finder.find_by_id(id).await?;
    Ok(ApiResponse::data(detail))
}

/// GET /api/track/{id}/audit
async fn audit_trail(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<ApiResponse<Vec<AuditLogEntry>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = AuditRepository::new(&state.db)
        .list_for_shipment(id.trim(), limit)
        .await?;
    Ok(ApiResponse::data(entries))
}

/// POST /api/track/{id}/admin-note
async fn admin_note(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AdminNoteRequest>,
) -> AppResult<ApiResponse<AuditLogEntry>> {
    let entry = state
        .editor
        .admin_note(
            &auth_user.actor(),
            id.trim(),
            &payload.note,
            payload.to_email.as_deref(),
        )
        .await?;
    Ok(ApiResponse::data(entry).with_message("note recorded"))
}
