//! Authentication service
//!
//! Worker accounts: Argon2 password hashing, login, invites, password
//! changes and the bootstrap IT account.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{format_timestamp, now, parse_db_timestamp};
use crate::models::{User, UserRole};

const USER_COLUMNS: &str = "id, email, password_hash, role, display_name, force_password_change, \
     active, last_seen_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    role: String,
    display_name: String,
    force_password_change: bool,
    active: bool,
    last_seen_at: Option<String>,
    created_at: String,
    updated_at: String,
}

/// Result of an invite: the account as stored, and whether it is new
#[derive(Debug, Clone)]
pub struct InviteOutcome {
    pub user: User,
    pub created: bool,
}

/// Authentication service for user management
#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
}

impl AuthService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hash a password using Argon2id
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(password_hash)
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Active user matching the email (any case) and password
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.get_user_by_email(email).await? else {
            return Ok(None);
        };

        if !user.active || !Self::verify_password(password, &user.password_hash)? {
            return Ok(None);
        }

        Ok(Some(user))
    }

    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")?;

        row.map(row_to_user).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        row.map(row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?
            .into_iter()
            .map(row_to_user)
            .collect()
    }

    /// Create the account, or flag an existing one for a password change
    ///
    /// An existing account keeps its role, name and password.
    pub async fn invite(
        &self,
        email: &str,
        role: UserRole,
        display_name: &str,
        temporary_password: &str,
    ) -> Result<InviteOutcome> {
        let email = normalize_email(email);
        let id = Uuid::new_v4();
        let password_hash = Self::hash_password(temporary_password)?;
        let ts = format_timestamp(now());

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, display_name, force_password_change, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, 1, ?, ?)
            ON CONFLICT (email) DO UPDATE SET force_password_change = 1, updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(&email)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(display_name.trim())
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await
        .context("Failed to upsert invited user")?;

        let user = self
            .get_user_by_email(&email)
            .await?
            .context("Invited user vanished after upsert")?;

        Ok(InviteOutcome {
            created: user.id == id,
            user,
        })
    }

    /// Set a new password, optionally rename, and clear the force-change flag
    pub async fn change_password(
        &self,
        id: &Uuid,
        new_password: &str,
        display_name: Option<&str>,
    ) -> Result<Option<User>> {
        let password_hash = Self::hash_password(new_password)?;
        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());

        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, display_name = COALESCE(?, display_name),
                force_password_change = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&password_hash)
        .bind(display_name)
        .bind(format_timestamp(now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to change password")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user_by_id(id).await
    }

    pub async fn touch_last_seen(&self, id: &Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_seen_at = ? WHERE id = ?")
            .bind(format_timestamp(now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update last seen")?;
        Ok(())
    }

    /// Create the first IT account unless that email is already registered
    ///
    /// Returns `true` when an account was created.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<bool> {
        if self.get_user_by_email(email).await?.is_some() {
            return Ok(false);
        }

        let outcome = self.invite(email, UserRole::It, "", password).await?;
        Ok(outcome.created)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn row_to_user(row: UserRow) -> Result<User> {
    let role = row.role.parse::<UserRole>().map_err(anyhow::Error::msg)?;
    Ok(User {
        id: Uuid::parse_str(&row.id).with_context(|| format!("Corrupt user id: {}", row.id))?,
        email: row.email,
        password_hash: row.password_hash,
        role,
        display_name: row.display_name,
        force_password_change: row.force_password_change,
        active: row.active,
        last_seen_at: row.last_seen_at.as_deref().map(parse_db_timestamp),
        created_at: parse_db_timestamp(&row.created_at),
        updated_at: parse_db_timestamp(&row.updated_at),
    })
}
