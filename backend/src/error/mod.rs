use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

pub mod auth;
pub mod store;

pub use auth::{AuthError, AuthResult};
pub use store::StoreError;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect username or password";

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND", None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN", None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT", None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST", None),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR",
                    None,
                )
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR",
                Some(serde_json::json!({ "errors": errors })),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: code.to_string(),
            details,
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::InternalServerError(err.into())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let unauthorized = |msg: &str| AppError::Unauthorized(msg.to_string());
        match err {
            AuthError::InvalidCredentials => unauthorized(INVALID_CREDENTIALS_MESSAGE),
            AuthError::InactiveAccount => unauthorized("Inactive user"),
            AuthError::InvalidToken => unauthorized("Invalid or expired token"),
            AuthError::ExpiredToken => unauthorized("Refresh token has expired"),
            AuthError::TokenRevoked => unauthorized("Refresh token has been invalidated"),
            AuthError::TokenNotFound => unauthorized("Refresh token not found or already used"),
            AuthError::UserNotFound => unauthorized("User associated with token not found"),
            AuthError::NotAuthenticated => unauthorized("Not authenticated"),
            AuthError::InvalidScheme => unauthorized("Invalid authentication scheme"),
            AuthError::AuthenticationFailed(reason) => unauthorized(reason),
            AuthError::InsufficientPrivileges => {
                AppError::Forbidden("The user doesn't have enough privileges".into())
            }
            AuthError::UsernameTaken => AppError::Conflict("Username already registered".into()),
            AuthError::EmailTaken => AppError::Conflict("Email already registered".into()),
            AuthError::MissingEmail => {
                AppError::BadRequest("Email is required for registration".into())
            }
            AuthError::Store(err) => AppError::InternalServerError(err.into()),
            AuthError::Internal(err) => AppError::InternalServerError(err),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}
