//! Public quote request endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{self, QuoteRepository},
    models::{Quote, QuoteRequest},
    services::mailer::{self, quote_recipients, OutboundEmail},
    utils::{ApiResponse, AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(submit_quote))
}

#[derive(Debug, Serialize)]
pub struct QuoteReceipt {
    pub id: Uuid,
}

fn quote_email_body(quote: &Quote) -> String {
    let details = if quote.details.trim().is_empty() {
        "-"
    } else {
        quote.details.as_str()
    };
    [
        format!("Name: {}", quote.name),
        format!("Email: {}", quote.email),
        format!("Department: {}", quote.department.as_str()),
        format!("Origin: {}", quote.origin),
        format!("Destination: {}", quote.destination),
        format!("Details: {}", details),
        format!("Ref: {}", quote.id),
    ]
    .join("\n")
}

/// POST /api/quote
async fn submit_quote(
    State(state): State<AppState>,
    Json(payload): Json<QuoteRequest>,
) -> AppResult<ApiResponse<QuoteReceipt>> {
    let missing = payload.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::invalid_fields("missing required fields", missing));
    }
    payload.validate()?;

    let text = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();
    let quote = Quote {
        id: Uuid::new_v4(),
        name: text(payload.name),
        email: text(payload.email),
        origin: text(payload.origin),
        destination: text(payload.destination),
        details: text(payload.details),
        department: payload.department.unwrap_or_default(),
        consent: payload.consent,
        created_at: db::now(),
    };

    QuoteRepository::new(&state.db).insert(&quote).await?;
    info!(quote_id = %quote.id, department = quote.department.as_str(), "Quote request stored");

    match quote_recipients(&state.config.mail, quote.department) {
        Some((to, cc)) => {
            let email = OutboundEmail {
                to,
                cc,
                reply_to: Some(quote.email.clone()),
                subject: format!(
                    "New Quote - {} ({} -> {})",
                    quote.name, quote.origin, quote.destination
                ),
                body: quote_email_body(&quote),
            };
            mailer::dispatch(state.mailer.clone(), email, "quote");
        }
        None => warn!(quote_id = %quote.id, "No inbox configured for quote requests"),
    }

    Ok(ApiResponse::data(QuoteReceipt { id: quote.id }))
}
