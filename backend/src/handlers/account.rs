use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use crate::validation::Validate;

use crate::{
    error::AppError,
    models::{
        token::MessageResponse,
        user::{EmailRequest, RegisterRequest, ResetPasswordRequest, UserResponse, VerifyEmailQuery},
    },
    services::NewAccount,
    state::AppState,
};

pub const RESEND_VERIFICATION_MESSAGE: &str =
    "If an account with that email exists and is not yet verified, a new verification email has been sent.";
pub const PASSWORD_RESET_REQUEST_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent.";
pub const PASSWORD_RESET_DONE_MESSAGE: &str = "Password has been reset successfully.";

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    payload.validate()?;

    let user = state
        .accounts
        .register(NewAccount {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            full_name: payload.full_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.accounts.verify_email(&query.token).await?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;
    let delivery = state.accounts.resend_verification(&payload.email).await?;
    tracing::debug!(?delivery, "Resend verification handled");
    Ok(Json(MessageResponse::new(RESEND_VERIFICATION_MESSAGE)))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;
    let delivery = state.accounts.request_password_reset(&payload.email).await?;
    tracing::debug!(?delivery, "Password reset request handled");
    Ok(Json(MessageResponse::new(PASSWORD_RESET_REQUEST_MESSAGE)))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;
    state
        .accounts
        .complete_password_reset(&payload.token, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse::new(PASSWORD_RESET_DONE_MESSAGE)))
}
