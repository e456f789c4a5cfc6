//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Worker role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    It,
    #[default]
    Ops,
    Finance,
    Admin,
    Driver,
    Warehouse,
    Dispatch,
}

impl UserRole {
    pub const ALL: [UserRole; 7] = [
        UserRole::It,
        UserRole::Ops,
        UserRole::Finance,
        UserRole::Admin,
        UserRole::Driver,
        UserRole::Warehouse,
        UserRole::Dispatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::It => "it",
            UserRole::Ops => "ops",
            UserRole::Finance => "finance",
            UserRole::Admin => "admin",
            UserRole::Driver => "driver",
            UserRole::Warehouse => "warehouse",
            UserRole::Dispatch => "dispatch",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        UserRole::ALL
            .into_iter()
            .find(|role| role.as_str() == lowered)
            .ok_or_else(|| format!("Invalid role: {}", s))
    }
}

/// Worker account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub display_name: String,
    pub force_password_change: bool,
    pub active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name shown in audit entries; falls back to the email
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }
}

/// Who is performing an operation, as carried by the session
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
}

impl Actor {
    /// Name shown in audit entries; falls back to the email
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        }
    }
}

/// User without password hash for safe serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub display_name: String,
    pub force_password_change: bool,
    pub active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            display_name: user.display_name,
            force_password_change: user.force_password_change,
            active: user.active,
            last_seen_at: user.last_seen_at,
            created_at: user.created_at,
        }
    }
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub ok: bool,
    pub token: String,
    pub force_password_change: bool,
    pub role: UserRole,
    pub email: String,
    pub display_name: String,
}

/// Change password request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub new_password: String,
    pub display_name: Option<String>,
}

/// Invite (or re-invite) a worker
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}
