#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::health::HealthResponse,
    models::{
        token::{LogoutRequest, MessageResponse, RefreshRequest, Token},
        user::{
            EmailRequest, ListUsersQuery, LoginRequest, RegisterRequest, ResetPasswordRequest,
            UpdateUserRequest, UserResponse, VerifyEmailQuery,
        },
    },
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_doc,
        register_doc,
        verify_email_doc,
        resend_verification_doc,
        login_doc,
        refresh_doc,
        password_reset_request_doc,
        password_reset_confirm_doc,
        logout_doc,
        logout_all_doc,
        me_doc,
        list_users_doc,
        get_user_doc,
        update_user_doc,
        delete_user_doc
    ),
    components(schemas(
        Token,
        RefreshRequest,
        LogoutRequest,
        MessageResponse,
        LoginRequest,
        RegisterRequest,
        EmailRequest,
        ResetPasswordRequest,
        UpdateUserRequest,
        UserResponse,
        HealthResponse,
        ErrorResponse
    )),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Auth", description = "Login, token refresh and logout"),
        (name = "Account", description = "Registration, e-mail verification and password reset"),
        (name = "Users", description = "Current user and superuser account management"),
        (name = "Health", description = "Liveness")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthResponse)),
    tag = "Health",
    security(())
)]
fn health_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Inactive account created; verification mail queued", body = UserResponse),
        (status = 400, description = "Validation failed or e-mail missing", body = ErrorResponse),
        (status = 409, description = "Username or e-mail already registered", body = ErrorResponse)
    ),
    tag = "Account",
    security(())
)]
fn register_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/auth/verify-email",
    params(VerifyEmailQuery),
    responses(
        (status = 200, description = "Account verified and activated", body = UserResponse),
        (status = 401, description = "Unknown, used or expired token", body = ErrorResponse)
    ),
    tag = "Account",
    security(())
)]
fn verify_email_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/resend-verification",
    request_body = EmailRequest,
    responses((status = 200, description = "Generic acknowledgement", body = MessageResponse)),
    tag = "Account",
    security(())
)]
fn resend_verification_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body(content = LoginRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token pair issued", body = Token),
        (status = 401, description = "Incorrect username or password, or inactive account", body = ErrorResponse)
    ),
    tag = "Auth",
    security(())
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = Token),
        (status = 401, description = "Invalid, unknown, revoked or expired refresh token", body = ErrorResponse)
    ),
    tag = "Auth",
    security(())
)]
fn refresh_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/request",
    request_body = EmailRequest,
    responses((status = 200, description = "Generic acknowledgement", body = MessageResponse)),
    tag = "Account",
    security(())
)]
fn password_reset_request_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/confirm",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions revoked", body = MessageResponse),
        (status = 401, description = "Unknown, used or expired token", body = ErrorResponse)
    ),
    tag = "Account",
    security(())
)]
fn password_reset_confirm_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = LogoutRequest,
    responses((status = 200, description = "Generic acknowledgement", body = MessageResponse)),
    tag = "Auth"
)]
fn logout_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    responses((status = 200, description = "Every session of the caller revoked", body = MessageResponse)),
    tag = "Auth"
)]
fn logout_all_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    tag = "Users"
)]
fn me_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users ordered by id", body = [UserResponse]),
        (status = 403, description = "Caller is not a superuser", body = ErrorResponse)
    ),
    tag = "Users"
)]
fn list_users_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, body = UserResponse),
        (status = 403, description = "Caller is not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Users"
)]
fn get_user_doc() {}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user; a password change or deactivation revokes its sessions", body = UserResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 403, description = "Caller is not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Username or e-mail already registered", body = ErrorResponse)
    ),
    tag = "Users"
)]
fn update_user_doc() {}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Deleted user; its sessions are removed with it", body = UserResponse),
        (status = 403, description = "Caller is not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Users"
)]
fn delete_user_doc() {}
