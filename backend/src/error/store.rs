//! Errors surfaced by the persistence collaborator.

use thiserror::Error;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write; carries the offending column.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            return StoreError::Unavailable(err.to_string());
        }
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let column = match db_err.constraint().unwrap_or_default() {
                    c if c.contains("username") => "username",
                    c if c.contains("email_verification") => "email_verification_token",
                    c if c.contains("password_reset") => "password_reset_token",
                    c if c.contains("email") => "email",
                    c if c.contains("refresh_token") => "refresh_token",
                    _ => "unknown",
                };
                return StoreError::UniqueViolation(column);
            }
        }
        StoreError::Database(err)
    }
}
