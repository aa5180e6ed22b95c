use axum::{
    extract::{Extension, State},
    Form, Json,
};

use crate::{
    error::AppError,
    models::{
        token::{LogoutRequest, MessageResponse, RefreshRequest, Token},
        user::LoginRequest,
    },
    state::AppState,
    utils::jwt::Claims,
};

pub const LOGOUT_MESSAGE: &str = "Successfully logged out";

/// OAuth2 password-grant style login (`application/x-www-form-urlencoded`).
pub async fn login(
    State(state): State<AppState>,
    Form(payload): Form<LoginRequest>,
) -> Result<Json<Token>, AppError> {
    let token = state.auth.login(&payload.username, &payload.password).await?;
    Ok(Json(token))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<Token>, AppError> {
    let token = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(token))
}

/// Same answer whether the token was live, already inactive, unknown or
/// owned by someone else.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .auth
        .logout(&payload.refresh_token, Some(&claims))
        .await?;
    Ok(Json(MessageResponse::new(LOGOUT_MESSAGE)))
}

pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, AppError> {
    let revoked = state.auth.logout_all(claims.user_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Logged out of {} session(s)",
        revoked
    ))))
}
