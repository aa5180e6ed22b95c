//! Superuser management of other accounts.

use std::sync::Arc;

use crate::error::{AuthError, AuthResult, StoreError};
use crate::models::user::{UpdateUserRequest, User, UserChanges};
use crate::repositories::UserStore;
use crate::services::session::SessionStore;
use crate::types::UserId;
use crate::utils::password::hash_password_blocking;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserStore>,
    sessions: SessionStore,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserStore>, sessions: SessionStore) -> Self {
        Self { users, sessions }
    }

    /// Resolves the caller of an admin route. Unknown and inactive callers
    /// fail authentication; active non-superusers fail authorisation.
    pub async fn authorize_superuser(&self, caller: UserId) -> AuthResult<User> {
        let user = self
            .users
            .find_by_id(caller)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::InactiveAccount);
        }
        if !user.is_superuser {
            tracing::warn!(user_id = %user.id, "Admin route refused: not a superuser");
            return Err(AuthError::InsufficientPrivileges);
        }
        Ok(user)
    }

    pub async fn list(&self, skip: i64, limit: i64) -> AuthResult<Vec<User>> {
        let limit = limit.clamp(0, MAX_PAGE_SIZE);
        Ok(self.users.list(skip.max(0), limit).await?)
    }

    pub async fn get(&self, id: UserId) -> AuthResult<Option<User>> {
        Ok(self.users.find_by_id(id).await?)
    }

    /// Applies the present fields of `update`. Changing the password or
    /// deactivating the account also revokes every session of the user.
    pub async fn update(&self, id: UserId, update: UpdateUserRequest) -> AuthResult<Option<User>> {
        let password_hash = match update.password {
            Some(password) => Some(hash_password_blocking(password).await?),
            None => None,
        };
        let revoke = password_hash.is_some() || update.is_active == Some(false);

        let changes = UserChanges {
            username: update.username,
            email: update.email,
            full_name: update.full_name,
            is_superuser: update.is_superuser,
            is_active: update.is_active,
            password_hash,
            ..Default::default()
        };
        if changes.is_empty() {
            return self.get(id).await;
        }

        let updated = self.users.update(id, changes).await.map_err(|err| match err {
            StoreError::UniqueViolation("username") => AuthError::UsernameTaken,
            StoreError::UniqueViolation("email") => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;

        if let Some(user) = &updated {
            if revoke {
                self.sessions.deactivate_all(user.id).await?;
            }
            tracing::info!(user_id = %user.id, revoked_sessions = revoke, "User updated");
        }
        Ok(updated)
    }

    /// Deletes the user; its sessions go with it.
    pub async fn delete(&self, id: UserId) -> AuthResult<Option<User>> {
        let removed = self.users.delete(id).await?;
        if let Some(user) = &removed {
            tracing::info!(user_id = %user.id, username = %user.username, "User deleted");
        }
        Ok(removed)
    }
}
