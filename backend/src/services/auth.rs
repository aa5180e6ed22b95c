//! Login, refresh-token rotation, logout and bearer verification.

use chrono::Utc;
use std::{sync::Arc, time::Duration};

use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use crate::models::token::Token;
use crate::models::user::User;
use crate::repositories::UserStore;
use crate::services::session::SessionStore;
use crate::types::UserId;
use crate::utils::jwt::{Claims, TokenCodec, TokenKind};
use crate::utils::password::{verify_dummy_password, verify_password_blocking};

/// What logout did. The HTTP layer answers identically for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    Revoked,
    /// The caller's access token belongs to a different user; the session
    /// was revoked anyway.
    RevokedForeign,
    AlreadyInactive,
    Unknown,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionStore,
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionStore,
        codec: TokenCodec,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            codec,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(
        config: &Config,
        users: Arc<dyn UserStore>,
        sessions: SessionStore,
        codec: TokenCodec,
    ) -> Self {
        Self::new(
            users,
            sessions,
            codec,
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        )
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<Token> {
        let Some(user) = self.users.find_by_username(username).await? else {
            verify_dummy_password(password.to_string()).await?;
            tracing::info!(username, "Login failed: unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password_blocking(password.to_string(), user.password_hash.clone()).await? {
            tracing::info!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login refused: inactive account");
            return Err(AuthError::InactiveAccount);
        }

        let (access_token, refresh_token) = self.issue_pair(&user)?;
        self.sessions
            .create(user.id, refresh_token.clone(), self.refresh_ttl)
            .await?;

        tracing::info!(user_id = %user.id, "Login succeeded");
        Ok(Token::bearer(access_token, refresh_token))
    }

    /// Exchanges a live refresh token for a new pair. The presented token is
    /// retired in the same unit that records its replacement, so of several
    /// concurrent calls with one token at most one succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<Token> {
        let claims = match self.codec.decode(refresh_token) {
            Ok(claims) if claims.kind == TokenKind::Refresh => claims,
            Ok(_) => {
                tracing::info!("Refresh rejected: not a refresh token");
                return Err(AuthError::InvalidToken);
            }
            Err(err) => {
                tracing::info!(error = %err, "Refresh rejected: token did not decode");
                return Err(AuthError::InvalidToken);
            }
        };

        let session = self
            .sessions
            .find_by_token(refresh_token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if !session.is_active {
            tracing::warn!(
                session_id = %session.id,
                user_id = %session.user_id,
                "Refresh rejected: token was already rotated or revoked"
            );
            return Err(AuthError::TokenRevoked);
        }

        if session.is_expired_at(Utc::now()) {
            self.sessions.deactivate(&session).await?;
            return Err(AuthError::ExpiredToken);
        }

        let Some(user) = self.users.find_by_id(session.user_id).await? else {
            self.sessions.deactivate(&session).await?;
            tracing::warn!(session_id = %session.id, "Refresh rejected: session owner missing");
            return Err(AuthError::UserNotFound);
        };

        if !user.is_active {
            self.sessions.deactivate(&session).await?;
            return Err(AuthError::InactiveAccount);
        }

        if claims.user_id != user.id {
            tracing::warn!(
                session_id = %session.id,
                claimed = %claims.user_id,
                owner = %user.id,
                "Refresh token subject does not match session owner"
            );
        }

        let (access_token, new_refresh) = self.issue_pair(&user)?;
        let Some(rotated) = self
            .sessions
            .rotate(&session, new_refresh.clone(), self.refresh_ttl)
            .await?
        else {
            tracing::warn!(session_id = %session.id, "Refresh lost rotation race");
            return Err(AuthError::TokenRevoked);
        };

        tracing::info!(
            user_id = %user.id,
            old_session = %session.id,
            new_session = %rotated.id,
            "Refresh token rotated"
        );
        Ok(Token::bearer(access_token, new_refresh))
    }

    /// Revokes the session of `refresh_token`. When `caller` is known and is
    /// not the owner, the session is still revoked and the mismatch logged.
    pub async fn logout(
        &self,
        refresh_token: &str,
        caller: Option<&Claims>,
    ) -> AuthResult<LogoutOutcome> {
        let Some(session) = self.sessions.find_by_token(refresh_token).await? else {
            tracing::debug!("Logout with unknown refresh token");
            return Ok(LogoutOutcome::Unknown);
        };

        if !session.is_active {
            tracing::debug!(session_id = %session.id, "Logout with inactive session");
            return Ok(LogoutOutcome::AlreadyInactive);
        }

        self.sessions.deactivate(&session).await?;

        match caller {
            Some(claims) if claims.user_id != session.user_id => {
                tracing::warn!(
                    session_id = %session.id,
                    owner = %session.user_id,
                    caller = %claims.user_id,
                    "Logout of a session owned by another user; revoked as compromised"
                );
                Ok(LogoutOutcome::RevokedForeign)
            }
            _ => {
                tracing::info!(user_id = %session.user_id, session_id = %session.id, "Logged out");
                Ok(LogoutOutcome::Revoked)
            }
        }
    }

    pub async fn logout_all(&self, user_id: UserId) -> AuthResult<u64> {
        self.sessions.deactivate_all(user_id).await
    }

    /// Decodes an access token for the request gate. Session state is not consulted.
    pub fn verify_bearer(&self, token: &str) -> AuthResult<Claims> {
        let claims = self
            .codec
            .decode(token)
            .map_err(|_| AuthError::AuthenticationFailed("Invalid or expired token"))?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::AuthenticationFailed("Invalid token type"));
        }
        if claims.sub.is_empty() {
            return Err(AuthError::AuthenticationFailed("Token subject missing"));
        }
        Ok(claims)
    }

    fn issue_pair(&self, user: &User) -> AuthResult<(String, String)> {
        let access = self
            .codec
            .issue(&user.username, user.id, TokenKind::Access, self.access_ttl)
            .map_err(|e| AuthError::Internal(e.into()))?;
        let refresh = self
            .codec
            .issue(&user.username, user.id, TokenKind::Refresh, self.refresh_ttl)
            .map_err(|e| AuthError::Internal(e.into()))?;
        Ok((access, refresh))
    }
}
