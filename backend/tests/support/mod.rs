#![allow(dead_code)]
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use passgate_backend::{
    app,
    config::Config,
    models::user::{EphemeralKind, EphemeralToken, NewUser, User, UserChanges},
    repositories::{InMemoryStore, UserStore},
    state::AppState,
    utils::{
        email::{EmailMessage, EmailSender, EmailTemplate},
        password::hash_password,
    },
};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const TEST_SECRET: &str = "test-secret-for-passgate-integration";
pub const PASSWORD: &str = "pw123456";

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [
        ("JWT_SECRET", TEST_SECRET),
        ("FRONTEND_URL", "http://localhost:8000"),
        ("EMAIL_MAX_RETRIES", "0"),
        ("EMAIL_RETRY_DELAY_SECONDS", "0"),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("test config")
}

/// Mailer that keeps every message for later inspection.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("lock mailer").clone()
    }

    /// Polls until a message of `template` for `recipient` shows up.
    pub async fn wait_for(&self, template: EmailTemplate, recipient: &str) -> EmailMessage {
        for _ in 0..200 {
            if let Some(found) = self
                .messages()
                .into_iter()
                .rev()
                .find(|m| m.template == template && m.recipient == recipient)
            {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {:?} email for {}", template, recipient);
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().expect("lock mailer").push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(config, store.clone(), store.clone(), mailer.clone());
        Self {
            state,
            store,
            mailer,
        }
    }

    pub fn router(&self) -> Router {
        app::router(self.state.clone())
    }

    pub async fn seed_user(&self, username: &str, active: bool) -> User {
        UserStore::create(
            self.store.as_ref(),
            NewUser {
                username: username.to_string(),
                email: Some(format!("{}@x.com", username)),
                full_name: None,
                password_hash: hash_password(PASSWORD).expect("hash password"),
                is_active: active,
                is_superuser: false,
                is_email_verified: active,
                email_verification: None,
            },
        )
        .await
        .expect("seed user")
    }

    pub async fn user(&self, username: &str) -> User {
        self.store
            .find_by_username(username)
            .await
            .expect("query user")
            .expect("user exists")
    }

    /// Overwrites the `kind` token of the user with one that is already expired.
    pub async fn plant_expired_token(&self, user: &User, kind: EphemeralKind, token: &str) {
        self.store
            .update(
                user.id,
                UserChanges::default().with_token(
                    kind,
                    Some(EphemeralToken {
                        token: token.to_string(),
                        expires_at: Utc::now() - ChronoDuration::minutes(5),
                    }),
                ),
            )
            .await
            .expect("plant token")
            .expect("user exists");
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn authed_json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().expect("header value"),
    );
    request
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "username={}&password={}",
            username, password
        )))
        .expect("build login request")
}

pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("build request")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
