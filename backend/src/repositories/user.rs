//! User persistence: the `UserStore` seam and its PostgreSQL implementation.
//!
//! The single-use verification and reset tokens live on the user row, so the
//! conditional update used to redeem them is part of this store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::db::connection::DbPool;
use crate::error::StoreError;
use crate::models::user::{EphemeralKind, NewUser, User, UserChanges};
use crate::types::UserId;

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, is_active, \
     is_superuser, is_email_verified, email_verification_token, \
     email_verification_token_expires_at, password_reset_token, \
     password_reset_token_expires_at, created_at, updated_at";

/// Repository trait for user rows.
///
/// Use `MockUserStore` in tests to script store behaviour.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;

    /// Inserts a user; duplicate usernames, e-mails or tokens yield `UniqueViolation`.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Applies `changes` and returns the updated row, or `None` for an unknown id.
    async fn update(&self, id: UserId, changes: UserChanges) -> Result<Option<User>, StoreError>;

    /// Users ordered by id, skipping `offset` rows.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError>;

    /// Removes the user together with every session it owns.
    async fn delete(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_ephemeral_token(
        &self,
        kind: EphemeralKind,
        token: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Applies `changes` only while the `kind` token of the user still equals
    /// `token`. Of two concurrent callers at most one gets `Some`.
    async fn update_if_token(
        &self,
        kind: EphemeralKind,
        token: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError>;

    /// Clears every token pair that expired before `now`; returns the number of pairs cleared.
    async fn clear_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn push_changes<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    changes: &'a UserChanges,
    now: DateTime<Utc>,
) {
    builder.push("UPDATE users SET updated_at = ").push_bind(now);
    if let Some(username) = &changes.username {
        builder.push(", username = ").push_bind(username);
    }
    if let Some(email) = &changes.email {
        builder.push(", email = ").push_bind(email);
    }
    if let Some(full_name) = &changes.full_name {
        builder.push(", full_name = ").push_bind(full_name);
    }
    if let Some(superuser) = changes.is_superuser {
        builder.push(", is_superuser = ").push_bind(superuser);
    }
    if let Some(hash) = &changes.password_hash {
        builder.push(", password_hash = ").push_bind(hash);
    }
    if let Some(active) = changes.is_active {
        builder.push(", is_active = ").push_bind(active);
    }
    if let Some(verified) = changes.is_email_verified {
        builder.push(", is_email_verified = ").push_bind(verified);
    }
    for (kind, slot) in [
        (EphemeralKind::EmailVerification, &changes.email_verification),
        (EphemeralKind::PasswordReset, &changes.password_reset),
    ] {
        if let Some(slot) = slot {
            builder
                .push(", ")
                .push(kind.token_column())
                .push(" = ")
                .push_bind(slot.as_ref().map(|t| t.token.clone()));
            builder
                .push(", ")
                .push(kind.expires_column())
                .push(" = ")
                .push_bind(slot.as_ref().map(|t| t.expires_at));
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&*self.pool)
                .await?,
        )
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&*self.pool)
                .await?,
        )
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let query = format!(
            r#"
            INSERT INTO users
                (username, email, full_name, password_hash, is_active, is_superuser,
                 is_email_verified, email_verification_token,
                 email_verification_token_expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.password_hash)
            .bind(user.is_active)
            .bind(user.is_superuser)
            .bind(user.is_email_verified)
            .bind(user.email_verification.as_ref().map(|t| t.token.clone()))
            .bind(user.email_verification.as_ref().map(|t| t.expires_at))
            .bind(now)
            .fetch_one(&*self.pool)
            .await?)
    }

    async fn update(&self, id: UserId, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut builder = QueryBuilder::new("");
        push_changes(&mut builder, &changes, Utc::now());
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(USER_COLUMNS);

        Ok(builder
            .build_query_as::<User>()
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let query = format!(
            "SELECT {} FROM users ORDER BY id OFFSET $1 LIMIT $2",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(offset)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?)
    }

    async fn delete(&self, id: UserId) -> Result<Option<User>, StoreError> {
        // sessions.user_id cascades
        let query = format!("DELETE FROM users WHERE id = $1 RETURNING {}", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn find_by_ephemeral_token(
        &self,
        kind: EphemeralKind,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {} FROM users WHERE {} = $1",
            USER_COLUMNS,
            kind.token_column()
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(token)
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn update_if_token(
        &self,
        kind: EphemeralKind,
        token: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut builder = QueryBuilder::new("");
        push_changes(&mut builder, &changes, Utc::now());
        builder
            .push(" WHERE ")
            .push(kind.token_column())
            .push(" = ")
            .push_bind(token)
            .push(" RETURNING ")
            .push(USER_COLUMNS);

        Ok(builder
            .build_query_as::<User>()
            .fetch_optional(&*self.pool)
            .await?)
    }

    async fn clear_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut cleared = 0;
        for kind in [EphemeralKind::EmailVerification, EphemeralKind::PasswordReset] {
            let query = format!(
                "UPDATE users SET {token} = NULL, {expires} = NULL, updated_at = $1 \
                 WHERE {token} IS NOT NULL AND {expires} <= $1",
                token = kind.token_column(),
                expires = kind.expires_column()
            );
            cleared += sqlx::query(&query)
                .bind(now)
                .execute(&*self.pool)
                .await?
                .rows_affected();
        }
        Ok(cleared)
    }
}
