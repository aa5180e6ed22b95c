//! Models for refresh-token sessions.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, FromRow)]
/// Database representation of one outstanding refresh token.
pub struct Session {
    pub id: SessionId,
    /// Owning user; the session references the user, it does not own it.
    pub user_id: UserId,
    /// Refresh token value, unique across all sessions and never reused.
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Monotonic: once false it is never set back to true.
    pub is_active: bool,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Fields required to insert a session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: UserId,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}
