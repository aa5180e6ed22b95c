use chrono::Utc;
use std::{sync::Arc, time::Duration};

use crate::error::AuthResult;
use crate::models::session::{NewSession, Session};
use crate::repositories::SessionRepository;
use crate::types::UserId;
use crate::utils::time::expires_in;

/// Server-side record of issued refresh tokens.
///
/// `find_by_token` is the only authority on whether a refresh token may still
/// be redeemed; the token's signature and `exp` alone are not enough.
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        user_id: UserId,
        refresh_token: String,
        ttl: Duration,
    ) -> AuthResult<Session> {
        let session = self
            .repo
            .create(NewSession {
                user_id,
                refresh_token,
                expires_at: expires_in(ttl)?,
            })
            .await?;
        tracing::debug!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok(session)
    }

    pub async fn find_by_token(&self, refresh_token: &str) -> AuthResult<Option<Session>> {
        Ok(self.repo.find_by_token(refresh_token).await?)
    }

    /// Idempotent; deactivating an inactive session only logs.
    pub async fn deactivate(&self, session: &Session) -> AuthResult<()> {
        if self.repo.deactivate(session.id).await? {
            tracing::debug!(session_id = %session.id, user_id = %session.user_id, "Session deactivated");
        } else {
            tracing::debug!(session_id = %session.id, "Session already inactive");
        }
        Ok(())
    }

    pub async fn deactivate_all(&self, user_id: UserId) -> AuthResult<u64> {
        let count = self.repo.deactivate_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, count, "Deactivated all sessions for user");
        Ok(count)
    }

    /// Retires `old` and records `refresh_token` in its place as one unit.
    /// `None` means `old` had already been retired by someone else.
    pub async fn rotate(
        &self,
        old: &Session,
        refresh_token: String,
        ttl: Duration,
    ) -> AuthResult<Option<Session>> {
        let replacement = NewSession {
            user_id: old.user_id,
            refresh_token,
            expires_at: expires_in(ttl)?,
        };
        Ok(self.repo.rotate(old.id, replacement).await?)
    }

    pub async fn purge_expired(&self) -> AuthResult<u64> {
        Ok(self.repo.purge_expired(Utc::now()).await?)
    }
}
