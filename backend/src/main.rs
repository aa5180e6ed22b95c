use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passgate_backend::{
    app,
    config::Config,
    db::connection::{create_pool, run_migrations},
    repositories::{InMemoryStore, PgSessionRepository, PgUserStore, SessionRepository, UserStore},
    state::AppState,
    utils::email::build_sender,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

/// Hides the password part of a connection string.
fn mask_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => match parsed.set_password(Some("***")) {
            Ok(()) => parsed.to_string(),
            Err(()) => "<unparseable>".into(),
        },
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable>".into(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passgate_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url.as_deref().map(mask_url).unwrap_or_else(|| "<in-memory>".into()),
        jwt_secret = %mask_secret(&config.jwt_secret),
        jwt_algorithm = ?config.jwt_algorithm,
        access_token_expire_minutes = config.access_token_expire_minutes,
        refresh_token_expire_minutes = config.refresh_token_expire_minutes,
        smtp_host = ?config.email.smtp_host,
        smtp_password = %config.email.smtp_password.as_deref().map(mask_secret).unwrap_or_default(),
        frontend_url = %config.frontend_url,
        "Loaded configuration from environment/.env"
    );

    let (users, sessions): (Arc<dyn UserStore>, Arc<dyn SessionRepository>) =
        match &config.database_url {
            Some(url) => {
                let pool = create_pool(url).await?;
                run_migrations(&pool).await?;
                let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
                let sessions: Arc<dyn SessionRepository> = Arc::new(PgSessionRepository::new(pool));
                (users, sessions)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
                let store = Arc::new(InMemoryStore::new());
                let users: Arc<dyn UserStore> = store.clone();
                let sessions: Arc<dyn SessionRepository> = store;
                (users, sessions)
            }
        };

    let email_sender = build_sender(&config.email)?;
    let addr = config.bind_addr;
    let state = AppState::new(config, users, sessions, email_sender);
    let app = app::router(state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
