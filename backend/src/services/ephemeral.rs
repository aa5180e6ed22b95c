//! Single-use verification and reset tokens kept on the user row.
//!
//! Unlike access/refresh tokens these carry no signature: a token is valid
//! exactly while the same string is stored on a user and its expiry is in
//! the future.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::RngCore;
use std::{sync::Arc, time::Duration};

use crate::error::{AuthError, AuthResult};
use crate::models::user::{EphemeralKind, EphemeralToken, User, UserChanges};
use crate::repositories::UserStore;
use crate::utils::time::expires_in;

const TOKEN_BYTES: usize = 32;

/// Result of presenting a token for consumption.
#[derive(Debug)]
pub enum Consumption {
    /// The token matched and the caller's changes were applied.
    Redeemed(User),
    /// The token matched but had expired; it has been cleared.
    Expired,
    /// No user holds this token (never issued, already used or replaced).
    Unknown,
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct EphemeralTokenLedger {
    users: Arc<dyn UserStore>,
}

impl EphemeralTokenLedger {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Mints a token that is not stored anywhere yet, e.g. for a user row
    /// that is about to be inserted.
    pub fn mint(ttl: Duration) -> AuthResult<EphemeralToken> {
        Ok(EphemeralToken {
            token: generate_token(),
            expires_at: expires_in(ttl)?,
        })
    }

    /// Stores `minted` as the `kind` token of the user together with
    /// `changes`, overwriting any previous token of that kind.
    pub async fn issue(
        &self,
        user: &User,
        kind: EphemeralKind,
        minted: EphemeralToken,
        changes: UserChanges,
    ) -> AuthResult<User> {
        self.users
            .update(user.id, changes.with_token(kind, Some(minted)))
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn find(&self, kind: EphemeralKind, token: &str) -> AuthResult<Option<User>> {
        Ok(self.users.find_by_ephemeral_token(kind, token).await?)
    }

    /// Redeems `token`, applying `effect` and clearing the token in the same
    /// conditional update. An expired token is cleared and reported as such.
    pub async fn consume(
        &self,
        kind: EphemeralKind,
        token: &str,
        effect: UserChanges,
    ) -> AuthResult<Consumption> {
        let Some(user) = self.find(kind, token).await? else {
            return Ok(Consumption::Unknown);
        };

        let expired = match user.ephemeral_token(kind) {
            Some((_, Some(expires_at))) => expires_at <= Utc::now(),
            _ => true,
        };

        if expired {
            self.users
                .update_if_token(kind, token, UserChanges::default().with_token(kind, None))
                .await?;
            tracing::info!(user_id = %user.id, kind = ?kind, "Expired token presented; cleared");
            return Ok(Consumption::Expired);
        }

        match self
            .users
            .update_if_token(kind, token, effect.with_token(kind, None))
            .await?
        {
            Some(user) => Ok(Consumption::Redeemed(user)),
            None => Ok(Consumption::Unknown),
        }
    }
}
