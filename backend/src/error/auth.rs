//! Failure taxonomy of the token and session lifecycle engine.

use thiserror::Error;

use super::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("incorrect username or password")]
    InvalidCredentials,
    #[error("account is inactive")]
    InactiveAccount,
    #[error("token is invalid")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("refresh token has been revoked")]
    TokenRevoked,
    #[error("refresh token not found")]
    TokenNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("username already registered")]
    UsernameTaken,
    #[error("email already registered")]
    EmailTaken,
    #[error("email is required")]
    MissingEmail,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid authentication scheme")]
    InvalidScheme,
    #[error("superuser privileges required")]
    InsufficientPrivileges,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
