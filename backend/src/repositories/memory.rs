//! Process-local store used when no `DATABASE_URL` is configured and by tests.
//!
//! Every operation runs under one lock, which gives the conditional updates
//! (`update_if_token`, `rotate`) the same all-or-nothing behaviour the
//! PostgreSQL implementation gets from row locks and transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::session::{NewSession, Session};
use crate::models::user::{EphemeralKind, NewUser, User, UserChanges};
use crate::repositories::session::SessionRepository;
use crate::repositories::user::UserStore;
use crate::types::{SessionId, UserId};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    sessions: BTreeMap<SessionId, Session>,
    next_user_id: i64,
    next_session_id: i64,
}

impl Tables {
    fn token_in_use(&self, kind: EphemeralKind, token: &str, except: Option<UserId>) -> bool {
        self.users.values().any(|u| {
            Some(u.id) != except && u.ephemeral_token(kind).map(|(t, _)| t) == Some(token)
        })
    }

    /// Checks the unique indexes a user row would violate after `changes`.
    fn check_changes(&self, id: UserId, changes: &UserChanges) -> Result<(), StoreError> {
        let others = || self.users.values().filter(move |u| u.id != id);
        if let Some(username) = &changes.username {
            if others().any(|u| &u.username == username) {
                return Err(StoreError::UniqueViolation("username"));
            }
        }
        if let Some(email) = &changes.email {
            if others().any(|u| u.email.as_ref() == Some(email)) {
                return Err(StoreError::UniqueViolation("email"));
            }
        }
        for (kind, slot) in [
            (EphemeralKind::EmailVerification, &changes.email_verification),
            (EphemeralKind::PasswordReset, &changes.password_reset),
        ] {
            if let Some(Some(token)) = slot {
                if self.token_in_use(kind, &token.token, Some(id)) {
                    return Err(StoreError::UniqueViolation(kind.token_column()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| u.username == username))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| u.email.as_deref() == Some(email)))
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation("username"));
        }
        if let Some(email) = &user.email {
            if tables.users.values().any(|u| u.email.as_ref() == Some(email)) {
                return Err(StoreError::UniqueViolation("email"));
            }
        }
        if let Some(token) = &user.email_verification {
            if tables.token_in_use(EphemeralKind::EmailVerification, &token.token, None) {
                return Err(StoreError::UniqueViolation("email_verification_token"));
            }
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let record = User {
            id: UserId::new(tables.next_user_id),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_email_verified: user.is_email_verified,
            email_verification_token: user.email_verification.as_ref().map(|t| t.token.clone()),
            email_verification_token_expires_at: user.email_verification.map(|t| t.expires_at),
            password_reset_token: None,
            password_reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: UserId, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&id) {
            return Ok(None);
        }
        tables.check_changes(id, &changes)?;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.apply(&changes, Utc::now());
            user.clone()
        }))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.lock().await;
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables.users.values().skip(offset).take(limit).cloned().collect())
    }

    async fn delete(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        let removed = tables.users.remove(&id);
        if removed.is_some() {
            tables.sessions.retain(|_, s| s.user_id != id);
        }
        Ok(removed)
    }

    async fn find_by_ephemeral_token(
        &self,
        kind: EphemeralKind,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.ephemeral_token(kind).map(|(t, _)| t) == Some(token))
            .cloned())
    }

    async fn update_if_token(
        &self,
        kind: EphemeralKind,
        token: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(id) = tables
            .users
            .values()
            .find(|u| u.ephemeral_token(kind).map(|(t, _)| t) == Some(token))
            .map(|u| u.id)
        else {
            return Ok(None);
        };
        tables.check_changes(id, &changes)?;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.apply(&changes, Utc::now());
            user.clone()
        }))
    }

    async fn clear_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut cleared = 0;
        for user in tables.users.values_mut() {
            for kind in [EphemeralKind::EmailVerification, EphemeralKind::PasswordReset] {
                let expired = matches!(
                    user.ephemeral_token(kind),
                    Some((_, Some(expires_at))) if expires_at <= now
                );
                if expired {
                    user.apply(&UserChanges::default().with_token(kind, None), now);
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut tables = self.tables.lock().await;
        insert_session(&mut tables, session)
    }

    async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.refresh_token == refresh_token)
            .cloned())
    }

    async fn deactivate(&self, id: SessionId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.sessions.get_mut(&id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                true
            }
            _ => false,
        })
    }

    async fn deactivate_all_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut count = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            session.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn rotate(
        &self,
        old: SessionId,
        replacement: NewSession,
    ) -> Result<Option<Session>, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get(&old) {
            Some(session) if session.is_active => {}
            _ => return Ok(None),
        }
        // Insert first so a duplicate token leaves the old session untouched.
        let created = insert_session(&mut tables, replacement)?;
        if let Some(session) = tables.sessions.get_mut(&old) {
            session.is_active = false;
        }
        Ok(Some(created))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

fn insert_session(tables: &mut Tables, session: NewSession) -> Result<Session, StoreError> {
    if tables
        .sessions
        .values()
        .any(|s| s.refresh_token == session.refresh_token)
    {
        return Err(StoreError::UniqueViolation("refresh_token"));
    }
    tables.next_session_id += 1;
    let record = Session {
        id: SessionId::new(tables.next_session_id),
        user_id: session.user_id,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
        created_at: Utc::now(),
        is_active: true,
    };
    tables.sessions.insert(record.id, record.clone());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::EphemeralToken;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: Some(email.into()),
            full_name: None,
            password_hash: "hash".into(),
            is_active: false,
            is_superuser: false,
            is_email_verified: false,
            email_verification: Some(EphemeralToken {
                token: format!("verify-{}", username),
                expires_at: Utc::now() + Duration::hours(1),
            }),
        }
    }

    fn new_session(user_id: UserId, token: &str) -> NewSession {
        NewSession {
            user_id,
            refresh_token: token.into(),
            expires_at: Utc::now() + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn create_enforces_unique_username_and_email() {
        let store = InMemoryStore::new();
        UserStore::create(&store, new_user("alice", "alice@x.com"))
            .await
            .unwrap();

        let dup_name = UserStore::create(&store, new_user("alice", "other@x.com")).await;
        assert!(matches!(dup_name, Err(StoreError::UniqueViolation("username"))));

        let dup_mail = UserStore::create(&store, new_user("bob", "alice@x.com")).await;
        assert!(matches!(dup_mail, Err(StoreError::UniqueViolation("email"))));
    }

    #[tokio::test]
    async fn update_if_token_applies_once() {
        let store = InMemoryStore::new();
        let user = UserStore::create(&store, new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        let redeem = || {
            UserChanges {
                is_active: Some(true),
                ..Default::default()
            }
            .with_token(EphemeralKind::EmailVerification, None)
        };

        let first = store
            .update_if_token(EphemeralKind::EmailVerification, "verify-alice", redeem())
            .await
            .unwrap();
        assert_eq!(first.map(|u| u.id), Some(user.id));

        let second = store
            .update_if_token(EphemeralKind::EmailVerification, "verify-alice", redeem())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn clear_expired_tokens_only_touches_expired_pairs() {
        let store = InMemoryStore::new();
        let user = UserStore::create(&store, new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        UserStore::create(&store, new_user("bob", "bob@x.com"))
            .await
            .unwrap();
        store
            .update(
                user.id,
                UserChanges::default().with_token(
                    EphemeralKind::EmailVerification,
                    Some(EphemeralToken {
                        token: "stale".into(),
                        expires_at: Utc::now() - Duration::minutes(1),
                    }),
                ),
            )
            .await
            .unwrap();

        assert_eq!(store.clear_expired_tokens(Utc::now()).await.unwrap(), 1);
        let alice = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(alice.email_verification_token.is_none());
        let bob = store.find_by_username("bob").await.unwrap().unwrap();
        assert!(bob.email_verification_token.is_some());
    }

    #[tokio::test]
    async fn rotate_is_refused_for_inactive_session() {
        let store = InMemoryStore::new();
        let old = SessionRepository::create(&store, new_session(UserId::new(1), "r1"))
            .await
            .unwrap();

        let rotated = store
            .rotate(old.id, new_session(UserId::new(1), "r2"))
            .await
            .unwrap()
            .expect("first rotation succeeds");
        assert!(rotated.is_active);
        assert!(!store.find_by_token("r1").await.unwrap().unwrap().is_active);

        let again = store
            .rotate(old.id, new_session(UserId::new(1), "r3"))
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(store.find_by_token("r3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivate_reports_transition_only_once() {
        let store = InMemoryStore::new();
        let session = SessionRepository::create(&store, new_session(UserId::new(1), "r1"))
            .await
            .unwrap();
        assert!(store.deactivate(session.id).await.unwrap());
        assert!(!store.deactivate(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn deactivate_all_and_purge() {
        let store = InMemoryStore::new();
        let user = UserId::new(1);
        SessionRepository::create(&store, new_session(user, "a")).await.unwrap();
        SessionRepository::create(&store, new_session(user, "b")).await.unwrap();
        SessionRepository::create(&store, new_session(UserId::new(2), "c"))
            .await
            .unwrap();
        SessionRepository::create(
            &store,
            NewSession {
                user_id: UserId::new(2),
                refresh_token: "old".into(),
                expires_at: Utc::now() - Duration::minutes(5),
            },
        )
        .await
        .unwrap();

        assert_eq!(store.deactivate_all_for_user(user).await.unwrap(), 2);
        assert!(store.find_by_token("c").await.unwrap().unwrap().is_active);
        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 1);
        assert!(store.find_by_token("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_rejects_taken_username_and_email() {
        let store = InMemoryStore::new();
        let alice = UserStore::create(&store, new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        UserStore::create(&store, new_user("bob", "bob@x.com"))
            .await
            .unwrap();

        let rename = UserChanges {
            username: Some("bob".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(alice.id, rename).await,
            Err(StoreError::UniqueViolation("username"))
        ));
        let remail = UserChanges {
            email: Some("bob@x.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(alice.id, remail).await,
            Err(StoreError::UniqueViolation("email"))
        ));

        let keep_own = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        assert!(store.update(alice.id, keep_own).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_owned_sessions() {
        let store = InMemoryStore::new();
        let alice = UserStore::create(&store, new_user("alice", "alice@x.com"))
            .await
            .unwrap();
        let bob = UserStore::create(&store, new_user("bob", "bob@x.com"))
            .await
            .unwrap();
        SessionRepository::create(&store, new_session(alice.id, "a1")).await.unwrap();
        SessionRepository::create(&store, new_session(bob.id, "b1")).await.unwrap();

        let removed = store.delete(alice.id).await.unwrap();
        assert_eq!(removed.map(|u| u.username), Some("alice".to_string()));
        assert!(store.find_by_token("a1").await.unwrap().is_none());
        assert!(store.find_by_token("b1").await.unwrap().is_some());
        assert!(store.delete(alice.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_pages_in_id_order() {
        let store = InMemoryStore::new();
        for name in ["alice", "bob", "carol"] {
            UserStore::create(&store, new_user(name, &format!("{}@x.com", name)))
                .await
                .unwrap();
        }
        let page: Vec<_> = store
            .list(1, 5)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(page, vec!["bob".to_string(), "carol".to_string()]);
        assert!(store.list(0, 0).await.unwrap().is_empty());
    }
}
