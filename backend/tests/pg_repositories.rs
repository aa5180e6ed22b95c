//! Runs against a real Postgres only when `TEST_DATABASE_URL` is set.

use chrono::{Duration as ChronoDuration, Utc};
use passgate_backend::{
    db::connection::{create_pool, run_migrations},
    error::StoreError,
    models::{
        session::NewSession,
        user::{EphemeralKind, EphemeralToken, NewUser, UserChanges},
    },
    repositories::{PgSessionRepository, PgUserStore, SessionRepository, UserStore},
};
use uuid::Uuid;

async fn stores() -> Option<(PgUserStore, PgSessionRepository)> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = create_pool(&url).await.expect("connect test database");
    run_migrations(&pool).await.expect("migrate test database");
    Some((PgUserStore::new(pool.clone()), PgSessionRepository::new(pool)))
}

fn new_user(tag: &str, verification: Option<EphemeralToken>) -> NewUser {
    NewUser {
        username: format!("{}-{}", tag, Uuid::new_v4()),
        email: Some(format!("{}-{}@x.com", tag, Uuid::new_v4())),
        full_name: None,
        password_hash: "hash".into(),
        is_active: false,
        is_superuser: false,
        is_email_verified: false,
        email_verification: verification,
    }
}

#[tokio::test]
async fn duplicate_username_maps_to_unique_violation() {
    let Some((users, _)) = stores().await else {
        return;
    };
    let first = users.create(new_user("dup", None)).await.unwrap();
    let mut again = new_user("dup", None);
    again.username = first.username.clone();

    assert!(matches!(
        users.create(again).await,
        Err(StoreError::UniqueViolation("username"))
    ));
}

#[tokio::test]
async fn update_if_token_redeems_once() {
    let Some((users, _)) = stores().await else {
        return;
    };
    let token = Uuid::new_v4().to_string();
    let user = users
        .create(new_user(
            "verify",
            Some(EphemeralToken {
                token: token.clone(),
                expires_at: Utc::now() + ChronoDuration::hours(1),
            }),
        ))
        .await
        .unwrap();

    let found = users
        .find_by_ephemeral_token(EphemeralKind::EmailVerification, &token)
        .await
        .unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));

    let effect = UserChanges {
        is_active: Some(true),
        is_email_verified: Some(true),
        ..Default::default()
    }
    .with_token(EphemeralKind::EmailVerification, None);

    let redeemed = users
        .update_if_token(EphemeralKind::EmailVerification, &token, effect.clone())
        .await
        .unwrap()
        .unwrap();
    assert!(redeemed.is_active);
    assert!(redeemed.email_verification_token.is_none());

    assert!(users
        .update_if_token(EphemeralKind::EmailVerification, &token, effect)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rotate_retires_old_session_exactly_once() {
    let Some((users, sessions)) = stores().await else {
        return;
    };
    let user = users.create(new_user("rotate", None)).await.unwrap();
    let expires_at = Utc::now() + ChronoDuration::days(1);
    let old = sessions
        .create(NewSession {
            user_id: user.id,
            refresh_token: Uuid::new_v4().to_string(),
            expires_at,
        })
        .await
        .unwrap();

    let next = NewSession {
        user_id: user.id,
        refresh_token: Uuid::new_v4().to_string(),
        expires_at,
    };
    let rotated = sessions.rotate(old.id, next).await.unwrap().unwrap();
    assert!(rotated.is_active);

    let retry = NewSession {
        user_id: user.id,
        refresh_token: Uuid::new_v4().to_string(),
        expires_at,
    };
    assert!(sessions.rotate(old.id, retry).await.unwrap().is_none());

    let old = sessions
        .find_by_token(&old.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert!(!old.is_active);
    assert_eq!(sessions.deactivate_all_for_user(user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn long_refresh_tokens_fit_and_deleting_the_user_drops_sessions() {
    let Some((users, sessions)) = stores().await else {
        return;
    };
    let user = users.create(new_user("long", None)).await.unwrap();
    let refresh_token = format!("{}.{}", "a".repeat(900), Uuid::new_v4());
    sessions
        .create(NewSession {
            user_id: user.id,
            refresh_token: refresh_token.clone(),
            expires_at: Utc::now() + ChronoDuration::days(1),
        })
        .await
        .unwrap();
    assert!(sessions.find_by_token(&refresh_token).await.unwrap().is_some());

    assert_eq!(users.delete(user.id).await.unwrap().map(|u| u.id), Some(user.id));
    assert!(sessions.find_by_token(&refresh_token).await.unwrap().is_none());
    assert!(users.delete(user.id).await.unwrap().is_none());
}
