//! Refresh-token session persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::connection::DbPool;
use crate::error::StoreError;
use crate::models::session::{NewSession, Session};
use crate::types::{SessionId, UserId};

const SESSION_COLUMNS: &str = "id, user_id, refresh_token, expires_at, created_at, is_active";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: NewSession) -> Result<Session, StoreError>;

    async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, StoreError>;

    /// Marks the session inactive. Returns true only when this call flipped it.
    async fn deactivate(&self, id: SessionId) -> Result<bool, StoreError>;

    async fn deactivate_all_for_user(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Deactivates `old` and inserts `replacement` as one unit. Returns `None`
    /// without inserting anything when `old` was no longer active.
    async fn rotate(
        &self,
        old: SessionId,
        replacement: NewSession,
    ) -> Result<Option<Session>, StoreError>;

    /// Deletes sessions whose expiry lies before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: DbPool,
}

impl PgSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn insert_query() -> String {
    format!(
        r#"
        INSERT INTO sessions (user_id, refresh_token, expires_at)
        VALUES ($1, $2, $3)
        RETURNING {}
        "#,
        SESSION_COLUMNS
    )
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: NewSession) -> Result<Session, StoreError> {
        Ok(sqlx::query_as::<_, Session>(&insert_query())
            .bind(session.user_id)
            .bind(&session.refresh_token)
            .bind(session.expires_at)
            .fetch_one(&*self.pool)
            .await?)
    }

    async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "SELECT {} FROM sessions WHERE refresh_token = $1",
            SESSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(refresh_token)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn deactivate(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = $1 AND is_active")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE sessions SET is_active = FALSE WHERE user_id = $1 AND is_active")
                .bind(user_id)
                .execute(&*self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old: SessionId,
        replacement: NewSession,
    ) -> Result<Option<Session>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let revoked =
            sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = $1 AND is_active")
                .bind(old)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        if revoked == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let session = sqlx::query_as::<_, Session>(&insert_query())
            .bind(replacement.user_id)
            .bind(&replacement.refresh_token)
            .bind(replacement.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(session))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
