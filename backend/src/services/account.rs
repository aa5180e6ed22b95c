//! Registration, e-mail verification and password reset.

use std::{sync::Arc, time::Duration};
use url::Url;

use crate::config::Config;
use crate::error::{AuthError, AuthResult, StoreError};
use crate::models::user::{EphemeralKind, EphemeralToken, NewUser, User, UserChanges};
use crate::repositories::UserStore;
use crate::services::ephemeral::{Consumption, EphemeralTokenLedger};
use crate::services::session::SessionStore;
use crate::utils::email::{
    current_year, expiry_text, EmailDispatcher, EmailMessage, EmailTemplate,
};
use crate::utils::password::hash_password_blocking;

const VERIFY_EMAIL_PATH: &str = "verify-email";
const RESET_PASSWORD_PATH: &str = "reset-password";

pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub full_name: Option<String>,
}

/// Whether a request that must look identical to callers actually did anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub frontend_url: Url,
    pub app_title: String,
    pub verification_ttl_hours: u64,
    pub reset_ttl_hours: u64,
}

impl LinkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frontend_url: config.frontend_url.clone(),
            app_title: config.app_title.clone(),
            verification_ttl_hours: config.email_verification_token_expire_hours,
            reset_ttl_hours: config.password_reset_token_expire_hours,
        }
    }

    fn verification_ttl(&self) -> Duration {
        Duration::from_secs(self.verification_ttl_hours * 3600)
    }

    fn reset_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_ttl_hours * 3600)
    }

    fn link(&self, path: &str, token: &EphemeralToken) -> AuthResult<String> {
        let mut url = self
            .frontend_url
            .join(path)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("invalid FRONTEND_URL: {}", e)))?;
        url.query_pairs_mut().append_pair("token", &token.token);
        Ok(url.into())
    }
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    ledger: EphemeralTokenLedger,
    sessions: SessionStore,
    mailer: EmailDispatcher,
    links: Arc<LinkSettings>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionStore,
        mailer: EmailDispatcher,
        links: LinkSettings,
    ) -> Self {
        Self {
            ledger: EphemeralTokenLedger::new(users.clone()),
            users,
            sessions,
            mailer,
            links: Arc::new(links),
        }
    }

    /// Creates an inactive, unverified user and mails a verification link.
    pub async fn register(&self, account: NewAccount) -> AuthResult<User> {
        let email = account.email.ok_or(AuthError::MissingEmail)?;

        if self.users.exists_by_username(&account.username).await? {
            return Err(AuthError::UsernameTaken);
        }
        if self.users.exists_by_email(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password_blocking(account.password).await?;
        let verification = EphemeralTokenLedger::mint(self.links.verification_ttl())?;
        let link = self.links.link(VERIFY_EMAIL_PATH, &verification)?;

        let user = self
            .users
            .create(NewUser {
                username: account.username,
                email: Some(email),
                full_name: account.full_name,
                password_hash,
                is_active: false,
                is_superuser: false,
                is_email_verified: false,
                email_verification: Some(verification),
            })
            .await
            .map_err(|err| match err {
                StoreError::UniqueViolation("username") => AuthError::UsernameTaken,
                StoreError::UniqueViolation("email") => AuthError::EmailTaken,
                other => {
                    tracing::error!(error = ?other, "Failed to create user during registration");
                    AuthError::Store(other)
                }
            })?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        self.send_verification(&user, link)?;
        Ok(user)
    }

    /// Activates the account holding `token`. Already verified accounts are
    /// returned unchanged.
    pub async fn verify_email(&self, token: &str) -> AuthResult<User> {
        let kind = EphemeralKind::EmailVerification;
        let user = self
            .ledger
            .find(kind, token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if user.is_email_verified {
            return Ok(user);
        }

        let effect = UserChanges {
            is_active: Some(true),
            is_email_verified: Some(true),
            ..Default::default()
        };
        match self.ledger.consume(kind, token, effect).await? {
            Consumption::Redeemed(user) => {
                tracing::info!(user_id = %user.id, "Email verified");
                Ok(user)
            }
            Consumption::Expired | Consumption::Unknown => Err(AuthError::InvalidToken),
        }
    }

    /// Replaces any pending verification token and mails a new link.
    /// Unknown and already verified addresses are skipped silently.
    pub async fn resend_verification(&self, email: &str) -> AuthResult<Delivery> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(Delivery::Skipped);
        };
        if user.is_email_verified {
            return Ok(Delivery::Skipped);
        }

        let changes = UserChanges {
            is_active: Some(false),
            ..Default::default()
        };
        let verification = EphemeralTokenLedger::mint(self.links.verification_ttl())?;
        let link = self.links.link(VERIFY_EMAIL_PATH, &verification)?;
        let user = self
            .ledger
            .issue(&user, EphemeralKind::EmailVerification, verification, changes)
            .await?;
        self.send_verification(&user, link)?;
        Ok(Delivery::Sent)
    }

    /// Unknown and inactive addresses are skipped silently.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<Delivery> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(Delivery::Skipped);
        };
        if !user.is_active {
            return Ok(Delivery::Skipped);
        }

        let reset = EphemeralTokenLedger::mint(self.links.reset_ttl())?;
        let link = self.links.link(RESET_PASSWORD_PATH, &reset)?;
        let user = self
            .ledger
            .issue(&user, EphemeralKind::PasswordReset, reset, UserChanges::default())
            .await?;

        let message = self
            .message(EmailTemplate::PasswordReset, &user, self.links.reset_ttl_hours)?
            .var("reset_link", link);
        self.mailer.dispatch(message);
        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(Delivery::Sent)
    }

    /// Sets a new password, activates the account and revokes every session.
    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> AuthResult<User> {
        let kind = EphemeralKind::PasswordReset;
        if self.ledger.find(kind, token).await?.is_none() {
            return Err(AuthError::InvalidToken);
        }

        let password_hash = hash_password_blocking(new_password.to_string()).await?;
        let effect = UserChanges {
            password_hash: Some(password_hash),
            is_active: Some(true),
            ..Default::default()
        };

        match self.ledger.consume(kind, token, effect).await? {
            Consumption::Redeemed(user) => {
                self.sessions.deactivate_all(user.id).await?;
                tracing::info!(user_id = %user.id, "Password reset completed");
                Ok(user)
            }
            Consumption::Expired | Consumption::Unknown => Err(AuthError::InvalidToken),
        }
    }

    fn send_verification(&self, user: &User, link: String) -> AuthResult<()> {
        let message = self
            .message(
                EmailTemplate::Verification,
                user,
                self.links.verification_ttl_hours,
            )?
            .var("verification_link", link);
        self.mailer.dispatch(message);
        Ok(())
    }

    fn message(
        &self,
        template: EmailTemplate,
        user: &User,
        ttl_hours: u64,
    ) -> AuthResult<EmailMessage> {
        let recipient = user.email.clone().ok_or(AuthError::MissingEmail)?;
        Ok(EmailMessage::new(template, recipient)
            .var("username", user.username.clone())
            .var("app_title", self.links.app_title.clone())
            .var("token_expiry_duration_text", expiry_text(ttl_hours))
            .var("current_year", current_year()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::session::MockSessionRepository;
    use crate::repositories::user::MockUserStore;
    use crate::repositories::InMemoryStore;
    use crate::utils::email::LogMailer;
    use crate::utils::password::hash_password;
    use chrono::Utc;

    fn links(frontend_url: &str) -> LinkSettings {
        LinkSettings {
            frontend_url: Url::parse(frontend_url).unwrap(),
            app_title: "Passgate".into(),
            verification_ttl_hours: 1,
            reset_ttl_hours: 2,
        }
    }

    fn token(value: &str) -> EphemeralToken {
        EphemeralToken {
            token: value.into(),
            expires_at: Utc::now(),
        }
    }

    fn service(users: Arc<dyn UserStore>, sessions: SessionStore, base: &str) -> AccountService {
        let mailer = EmailDispatcher::new(Arc::new(LogMailer), 0, Duration::ZERO);
        AccountService::new(users, sessions, mailer, links(base))
    }

    fn in_memory_service(base: &str) -> (AccountService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone(), SessionStore::new(store.clone()), base);
        (service, store)
    }

    #[test]
    fn links_embed_encoded_token() {
        let link = links("http://localhost:8000")
            .link(VERIFY_EMAIL_PATH, &token("a-b_c"))
            .unwrap();
        assert_eq!(link, "http://localhost:8000/verify-email?token=a-b_c");
    }

    #[test]
    fn links_respect_base_path() {
        let link = links("https://app.example.com/portal/")
            .link(RESET_PASSWORD_PATH, &token("tok"))
            .unwrap();
        assert_eq!(link, "https://app.example.com/portal/reset-password?token=tok");
    }

    #[test]
    fn non_base_frontend_url_is_internal_error() {
        assert!(matches!(
            links("mailto:ops@x.com").link(VERIFY_EMAIL_PATH, &token("tok")),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn ttl_hours_become_durations() {
        let settings = links("http://localhost:8000");
        assert_eq!(settings.verification_ttl(), Duration::from_secs(3600));
        assert_eq!(settings.reset_ttl(), Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn unusable_link_base_persists_nothing() {
        let (service, store) = in_memory_service("mailto:ops@x.com");
        let account = || NewAccount {
            username: "alice".into(),
            email: Some("alice@x.com".into()),
            password: "pw123456".into(),
            full_name: None,
        };

        assert!(matches!(service.register(account()).await, Err(AuthError::Internal(_))));
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        // a retry fails the same way instead of hitting the unique username
        assert!(matches!(service.register(account()).await, Err(AuthError::Internal(_))));

        let bob = UserStore::create(
            store.as_ref(),
            NewUser {
                username: "bob".into(),
                email: Some("bob@x.com".into()),
                full_name: None,
                password_hash: hash_password("pw123456").unwrap(),
                is_active: true,
                is_superuser: false,
                is_email_verified: true,
                email_verification: None,
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            service.request_password_reset("bob@x.com").await,
            Err(AuthError::Internal(_))
        ));
        let bob = store.find_by_id(bob.id).await.unwrap().unwrap();
        assert!(bob.password_reset_token.is_none());
    }

    #[tokio::test]
    async fn unknown_reset_token_is_rejected_before_any_write() {
        let mut users = MockUserStore::new();
        users
            .expect_find_by_ephemeral_token()
            .withf(|kind, token| *kind == EphemeralKind::PasswordReset && token == "nope")
            .times(1)
            .returning(|_, _| Ok(None));
        users.expect_update_if_token().never();
        let mut sessions = MockSessionRepository::new();
        sessions.expect_deactivate_all_for_user().never();
        let service = service(
            Arc::new(users),
            SessionStore::new(Arc::new(sessions)),
            "http://localhost:8000",
        );

        assert!(matches!(
            service.complete_password_reset("nope", "newpass99").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
