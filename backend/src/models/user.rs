//! Models that represent users, registration payloads and the single-use tokens
//! stored on the user row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::types::UserId;
use crate::validation::{rules, Validate};

#[derive(Debug, Clone, FromRow)]
/// Database representation of a user account.
pub struct User {
    /// Database-assigned identifier, immutable after creation.
    pub id: UserId,
    /// Unique, case-sensitive login name.
    pub username: String,
    /// Unique e-mail address.
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// Argon2 PHC string of the user's password.
    pub password_hash: String,
    /// Gates login and refresh.
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_token_expires_at: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Returns the stored token and expiry for the given flow, if any.
    pub fn ephemeral_token(&self, kind: EphemeralKind) -> Option<(&str, Option<DateTime<Utc>>)> {
        match kind {
            EphemeralKind::EmailVerification => self
                .email_verification_token
                .as_deref()
                .map(|t| (t, self.email_verification_token_expires_at)),
            EphemeralKind::PasswordReset => self
                .password_reset_token
                .as_deref()
                .map(|t| (t, self.password_reset_token_expires_at)),
        }
    }

    /// Applies a partial update in place; stores use this to keep semantics identical.
    pub fn apply(&mut self, changes: &UserChanges, now: DateTime<Utc>) {
        if let Some(username) = &changes.username {
            self.username = username.clone();
        }
        if let Some(email) = &changes.email {
            self.email = Some(email.clone());
        }
        if let Some(full_name) = &changes.full_name {
            self.full_name = Some(full_name.clone());
        }
        if let Some(superuser) = changes.is_superuser {
            self.is_superuser = superuser;
        }
        if let Some(hash) = &changes.password_hash {
            self.password_hash = hash.clone();
        }
        if let Some(active) = changes.is_active {
            self.is_active = active;
        }
        if let Some(verified) = changes.is_email_verified {
            self.is_email_verified = verified;
        }
        if let Some(slot) = &changes.email_verification {
            self.email_verification_token = slot.as_ref().map(|t| t.token.clone());
            self.email_verification_token_expires_at = slot.as_ref().map(|t| t.expires_at);
        }
        if let Some(slot) = &changes.password_reset {
            self.password_reset_token = slot.as_ref().map(|t| t.token.clone());
            self.password_reset_token_expires_at = slot.as_ref().map(|t| t.expires_at);
        }
        self.updated_at = now;
    }
}

/// Which single-use token pair on the user row a flow operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EphemeralKind {
    EmailVerification,
    PasswordReset,
}

impl EphemeralKind {
    pub fn token_column(self) -> &'static str {
        match self {
            EphemeralKind::EmailVerification => "email_verification_token",
            EphemeralKind::PasswordReset => "password_reset_token",
        }
    }

    pub fn expires_column(self) -> &'static str {
        match self {
            EphemeralKind::EmailVerification => "email_verification_token_expires_at",
            EphemeralKind::PasswordReset => "password_reset_token_expires_at",
        }
    }
}

/// A freshly minted single-use token and its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Fields required to insert a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_email_verified: bool,
    pub email_verification: Option<EphemeralToken>,
}

/// Partial update of a user row. `None` leaves a field untouched; for the
/// token slots `Some(None)` clears the pair.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_superuser: Option<bool>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_email_verified: Option<bool>,
    pub email_verification: Option<Option<EphemeralToken>>,
    pub password_reset: Option<Option<EphemeralToken>>,
}

impl UserChanges {
    /// Sets the token slot of `kind`.
    pub fn with_token(mut self, kind: EphemeralKind, token: Option<EphemeralToken>) -> Self {
        match kind {
            EphemeralKind::EmailVerification => self.email_verification = Some(token),
            EphemeralKind::PasswordReset => self.password_reset = Some(token),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.full_name.is_none()
            && self.is_superuser.is_none()
            && self.password_hash.is_none()
            && self.is_active.is_none()
            && self.is_email_verified.is_none()
            && self.email_verification.is_none()
            && self.password_reset.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload used to self-register an account.
pub struct RegisterRequest {
    #[validate(custom(function = "rules::validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"), length(max = 100))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirm: String,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// OAuth2 password-grant style login form.
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload carrying only an e-mail address (resend verification, request reset).
pub struct EmailRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
/// Query string of the e-mail verification link.
pub struct VerifyEmailQuery {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for completing a password reset.
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
/// Superuser edit of another account. Absent fields are left untouched; a
/// new `password` is hashed before it is stored.
pub struct UpdateUserRequest {
    #[validate(custom(function = "rules::validate_username"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email address"), length(max = 100))]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
/// Paging of the user listing.
pub struct ListUsersQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_page_size")]
    pub limit: i64,
}

fn default_page_size() -> i64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Public view of a user; never exposes the hash or pending tokens.
pub struct UserResponse {
    #[schema(value_type = i64)]
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
        }
    }
}
