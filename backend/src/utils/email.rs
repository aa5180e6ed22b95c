use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::config::EmailConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    Verification,
    PasswordReset,
}

impl EmailTemplate {
    pub fn name(self) -> &'static str {
        match self {
            EmailTemplate::Verification => "verification_email",
            EmailTemplate::PasswordReset => "password_reset_email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub template: EmailTemplate,
    pub recipient: String,
    pub variables: BTreeMap<String, String>,
}

impl EmailMessage {
    pub fn new(template: EmailTemplate, recipient: impl Into<String>) -> Self {
        Self {
            template,
            recipient: recipient.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    fn get(&self, key: &str) -> &str {
        self.variables.get(key).map(String::as_str).unwrap_or_default()
    }

    /// Renders the plain-text subject and body for this template.
    pub fn render(&self) -> (String, String) {
        let app_title = self.get("app_title");
        let footer = format!("---\n{} (c) {}", app_title, self.get("current_year"));
        match self.template {
            EmailTemplate::Verification => (
                format!("Verify your email address for {}", app_title),
                format!(
                    "Hi {},\n\nPlease confirm your email address by opening the link below:\n\n{}\n\nThis link is valid for {}.\n\nIf you did not create an account, you can ignore this email.\n\n{}\n",
                    self.get("username"),
                    self.get("verification_link"),
                    self.get("token_expiry_duration_text"),
                    footer
                ),
            ),
            EmailTemplate::PasswordReset => (
                format!("Password Reset Request for {}", app_title),
                format!(
                    "Hi {},\n\nWe received a request to reset your password. Open the link below to choose a new one:\n\n{}\n\nThis link is valid for {}.\n\nIf you did not request a reset, you can ignore this email.\n\n{}\n",
                    self.get("username"),
                    self.get("reset_link"),
                    self.get("token_expiry_duration_text"),
                    footer
                ),
            ),
        }
    }
}

/// Formats a TTL in hours the way it appears in email bodies ("1 hour", "2 hours").
pub fn expiry_text(hours: u64) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{} hours", hours)
    }
}

pub fn current_year() -> String {
    Utc::now().year().to_string()
}

/// Outbound mail collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(host: &str, config: &EmailConfig) -> Result<Self> {
        let mailer = match (&config.smtp_username, &config.smtp_password) {
            (Some(username), Some(password)) => {
                let creds = Credentials::new(username.clone(), password.clone());
                AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
                    .port(config.smtp_port)
                    .credentials(creds)
                    .build()
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(config.smtp_port)
                .build(),
        };

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let (subject, body) = message.render();
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(message.recipient.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

/// Used when no SMTP host is configured: records the message in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let (subject, body) = message.render();
        tracing::info!(
            template = message.template.name(),
            recipient = %message.recipient,
            subject = %subject,
            body = %body,
            "SMTP not configured; email logged instead of sent"
        );
        Ok(())
    }
}

pub fn build_sender(config: &EmailConfig) -> Result<Arc<dyn EmailSender>> {
    match &config.smtp_host {
        Some(host) => Ok(Arc::new(SmtpMailer::new(host, config)?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

/// Fire-and-forget delivery with a bounded retry policy.
#[derive(Clone)]
pub struct EmailDispatcher {
    sender: Arc<dyn EmailSender>,
    max_retries: u32,
    retry_delay: Duration,
}

impl EmailDispatcher {
    pub fn new(sender: Arc<dyn EmailSender>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            sender,
            max_retries,
            retry_delay,
        }
    }

    pub fn from_config(sender: Arc<dyn EmailSender>, config: &EmailConfig) -> Self {
        Self::new(
            sender,
            config.max_retries,
            Duration::from_secs(config.retry_delay_seconds),
        )
    }

    /// Spawns delivery and returns immediately. The handle resolves to whether
    /// the message was eventually accepted; callers are free to drop it.
    pub fn dispatch(&self, message: EmailMessage) -> JoinHandle<bool> {
        let sender = Arc::clone(&self.sender);
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;
        tokio::spawn(async move { deliver(sender, message, max_retries, retry_delay).await })
    }
}

async fn deliver(
    sender: Arc<dyn EmailSender>,
    message: EmailMessage,
    max_retries: u32,
    retry_delay: Duration,
) -> bool {
    let mut attempt = 0;
    loop {
        match sender.send(&message).await {
            Ok(()) => {
                tracing::info!(
                    template = message.template.name(),
                    recipient = %message.recipient,
                    attempt,
                    "Email sent"
                );
                return true;
            }
            Err(err) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    error = ?err,
                    template = message.template.name(),
                    recipient = %message.recipient,
                    attempt,
                    max_retries,
                    "Email delivery failed; retrying"
                );
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    template = message.template.name(),
                    recipient = %message.recipient,
                    "Email delivery failed; giving up"
                );
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn verification_message() -> EmailMessage {
        EmailMessage::new(EmailTemplate::Verification, "alice@x.com")
            .var("username", "alice")
            .var("verification_link", "http://localhost:8000/verify-email?token=abc")
            .var("app_title", "Passgate")
            .var("token_expiry_duration_text", expiry_text(1))
            .var("current_year", "2026")
    }

    #[test]
    fn render_embeds_link_and_title() {
        let (subject, body) = verification_message().render();
        assert_eq!(subject, "Verify your email address for Passgate");
        assert!(body.contains("token=abc"));
        assert!(body.contains("1 hour."));
    }

    #[test]
    fn expiry_text_pluralizes() {
        assert_eq!(expiry_text(1), "1 hour");
        assert_eq!(expiry_text(24), "24 hours");
    }

    #[tokio::test]
    async fn dispatcher_delivers_once_on_success() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send()
            .withf(|m| m.template == EmailTemplate::Verification && m.recipient == "alice@x.com")
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = EmailDispatcher::new(Arc::new(sender), 3, Duration::from_millis(1));
        assert!(dispatcher.dispatch(verification_message()).await.unwrap());
    }

    #[tokio::test]
    async fn dispatcher_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut sender = MockEmailSender::new();
        sender.expect_send().times(3).returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("smtp down"))
            } else {
                Ok(())
            }
        });

        let dispatcher = EmailDispatcher::new(Arc::new(sender), 3, Duration::from_millis(1));
        assert!(dispatcher.dispatch(verification_message()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatcher_gives_up_after_max_retries() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send()
            .times(3)
            .returning(|_| Err(anyhow::anyhow!("smtp down")));

        let dispatcher = EmailDispatcher::new(Arc::new(sender), 2, Duration::from_millis(1));
        assert!(!dispatcher.dispatch(verification_message()).await.unwrap());
    }
}
