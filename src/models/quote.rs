//! Quote request model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::utils::validation::non_blank;

/// Department a quote is routed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    #[default]
    Ops,
    Finance,
    Admin,
    It,
    Business,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Ops => "ops",
            Department::Finance => "finance",
            Department::Admin => "admin",
            Department::It => "it",
            Department::Business => "business",
        }
    }
}

/// Public quote form submission
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct QuoteRequest {
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    #[validate(length(max = 5000))]
    pub details: Option<String>,
    #[serde(default, alias = "dept")]
    pub department: Option<Department>,
    #[serde(default)]
    pub consent: bool,
}

impl QuoteRequest {
    /// Required fields that are absent or blank, in form order
    pub fn missing_fields(&self) -> Vec<String> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("origin", &self.origin),
            ("destination", &self.destination),
        ]
        .into_iter()
        .filter(|(_, value)| non_blank(value.as_deref()).is_none())
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

/// Stored quote
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub origin: String,
    pub destination: String,
    pub details: String,
    pub department: Department,
    pub consent: bool,
    pub created_at: DateTime<Utc>,
}
