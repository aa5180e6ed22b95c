use anyhow::{anyhow, bail, Context};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::Algorithm;
use rand::RngCore;
use std::{env, net::SocketAddr, str::FromStr, time::Duration};
use url::Url;

/// Paths reachable without a bearer token unless `PUBLIC_PATHS` overrides them.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/",
    "/health",
    "/docs",
    "/docs/",
    "/api-docs/",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
    "/api/v1/auth/register",
    "/api/v1/auth/verify-email",
    "/api/v1/auth/resend-verification",
    "/api/v1/auth/password-reset/request",
    "/api/v1/auth/password-reset/confirm",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: u64,
    pub refresh_token_expire_minutes: u64,
    pub email_verification_token_expire_hours: u64,
    pub password_reset_token_expire_hours: u64,
    pub public_paths: Vec<String>,
    /// Base that e-mailed links are joined onto.
    pub frontend_url: Url,
    pub app_title: String,
    pub bind_addr: SocketAddr,
    pub email: EmailConfig,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "JWT_SECRET is not set; generated an ephemeral secret, tokens will not survive a restart"
                );
                random_secret()
            }
        };

        let jwt_algorithm = match get("JWT_ALGORITHM") {
            Some(name) => parse_algorithm(&name)?,
            None => Algorithm::HS256,
        };

        let public_paths = match get("PUBLIC_PATHS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        };

        let email = EmailConfig {
            smtp_host: get("SMTP_HOST"),
            smtp_port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
            smtp_username: get("SMTP_USERNAME"),
            smtp_password: get("SMTP_PASSWORD"),
            from_address: get("SMTP_FROM_ADDRESS")
                .unwrap_or_else(|| "noreply@passgate.local".to_string()),
            max_retries: parse_or("EMAIL_MAX_RETRIES", get("EMAIL_MAX_RETRIES"), 3)?,
            retry_delay_seconds: parse_or(
                "EMAIL_RETRY_DELAY_SECONDS",
                get("EMAIL_RETRY_DELAY_SECONDS"),
                60,
            )?,
        };

        Ok(Config {
            database_url: get("DATABASE_URL"),
            jwt_secret,
            jwt_algorithm,
            access_token_expire_minutes: parse_or(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                get("ACCESS_TOKEN_EXPIRE_MINUTES"),
                30,
            )?,
            refresh_token_expire_minutes: parse_or(
                "REFRESH_TOKEN_EXPIRE_MINUTES",
                get("REFRESH_TOKEN_EXPIRE_MINUTES"),
                60 * 24 * 8,
            )?,
            email_verification_token_expire_hours: parse_or(
                "EMAIL_VERIFICATION_TOKEN_EXPIRE_HOURS",
                get("EMAIL_VERIFICATION_TOKEN_EXPIRE_HOURS"),
                1,
            )?,
            password_reset_token_expire_hours: parse_or(
                "PASSWORD_RESET_TOKEN_EXPIRE_HOURS",
                get("PASSWORD_RESET_TOKEN_EXPIRE_HOURS"),
                1,
            )?,
            public_paths,
            frontend_url: parse_frontend_url(get("FRONTEND_URL"))?,
            app_title: get("APP_TITLE").unwrap_or_else(|| "Passgate".to_string()),
            bind_addr: parse_or(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
            email,
        })
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_expire_minutes * 60)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expire_minutes * 60)
    }
}

fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    match name.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(anyhow!(
            "Unsupported JWT_ALGORITHM value: {} (expected HS256, HS384 or HS512)",
            name
        )),
    }
}

fn parse_frontend_url(raw: Option<String>) -> anyhow::Result<Url> {
    let raw = raw.unwrap_or_else(|| "http://localhost:8000".to_string());
    let url = Url::parse(&raw).with_context(|| format!("Invalid FRONTEND_URL value: {}", raw))?;
    if url.cannot_be_a_base() {
        bail!("Invalid FRONTEND_URL value: {} (links cannot be joined onto it)", raw);
    }
    Ok(url)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, value)),
        None => Ok(default),
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
