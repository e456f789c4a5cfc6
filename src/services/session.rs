//! Session tokens
//!
//! Signed HS256 JWTs carrying a point-in-time copy of the user's identity and
//! role. Tokens close to expiry are reissued with a fresh lifetime by the auth
//! middleware.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{User, UserRole};

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "jwt";

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub name: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Not before timestamp
    pub nbf: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, SessionError> {
        Uuid::parse_str(&self.sub).map_err(|_| SessionError::Invalid)
    }

    /// Time left before expiry; negative once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        Duration::seconds(self.exp - now.timestamp())
    }
}

/// Identity fields copied into every token
#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub display_name: String,
}

impl From<&User> for SessionIdentity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            display_name: user.display_name.clone(),
        }
    }
}

impl TryFrom<&Claims> for SessionIdentity {
    type Error = SessionError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.user_id()?,
            email: claims.email.clone(),
            role: claims.role,
            display_name: claims.name.clone(),
        })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing token")]
    Missing,
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues, verifies and renews session tokens
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    renew_threshold: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(secret: &str, ttl: Duration, renew_threshold: Duration, secure_cookies: bool) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            renew_threshold,
            secure_cookies,
        }
    }

    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            &config.jwt_secret,
            config.ttl()?,
            config.renew_threshold(),
            config.secure_cookies,
        ))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> Result<String, SessionError> {
        self.issue_at(&SessionIdentity::from(user), Utc::now())
    }

    pub fn issue_at(
        &self,
        identity: &SessionIdentity,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let claims = Claims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            role: identity.role,
            name: identity.display_name.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(SessionError::Signing)
    }

    /// Reject malformed, forged and expired tokens
    pub fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        if token.trim().is_empty() {
            return Err(SessionError::Missing);
        }

        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            })
    }

    pub fn maybe_renew(&self, claims: &Claims) -> Result<Option<String>, SessionError> {
        self.maybe_renew_at(claims, Utc::now())
    }

    /// A fresh token with the same identity when the current one is inside the
    /// renewal window (`0 < remaining < threshold`)
    pub fn maybe_renew_at(
        &self,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, SessionError> {
        let remaining = claims.remaining_at(now);
        if remaining <= Duration::zero() || remaining >= self.renew_threshold {
            return Ok(None);
        }

        let identity = SessionIdentity::try_from(claims)?;
        self.issue_at(&identity, now).map(Some)
    }

    /// Session cookie carrying a token
    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        self.cookie(token.to_string(), self.ttl.num_seconds())
    }

    /// Cookie that deletes the session cookie
    pub fn removal_cookie(&self) -> Cookie<'static> {
        self.cookie(String::new(), 0)
    }

    fn cookie(&self, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age_secs))
            .secure(self.secure_cookies)
            .build()
    }
}
