use chrono::Utc;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passgate_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::{PgSessionRepository, PgUserStore, UserStore},
    services::SessionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passgate_backend=info,session_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for session cleanup"))?;
    let pool = create_pool(database_url).await?;

    let sessions = SessionStore::new(Arc::new(PgSessionRepository::new(pool.clone())));
    let deleted_sessions = sessions.purge_expired().await?;
    if deleted_sessions > 0 {
        tracing::info!("Deleted {} expired sessions", deleted_sessions);
    }

    let cleared_tokens = PgUserStore::new(pool.clone())
        .clear_expired_tokens(Utc::now())
        .await?;
    if cleared_tokens > 0 {
        tracing::info!("Cleared {} expired verification/reset tokens", cleared_tokens);
    }

    sqlx::query("VACUUM (ANALYZE) sessions")
        .execute(&*pool)
        .await?;

    Ok(())
}
