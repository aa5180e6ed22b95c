use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{
    error::{AppError, AuthError, AuthResult},
    state::AppState,
    utils::jwt::Claims,
};

const INVALID_OR_EXPIRED_TOKEN: &str = "Invalid or expired token";

/// Request gate: every path outside the allow-list needs a valid access
/// token, whose claims are attached to the request for handlers.
pub async fn gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if is_public_path(request.uri().path(), &state.config.public_paths) {
        return Ok(next.run(request).await);
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = bearer_token(header_value)?;

    let claims = state.auth.verify_bearer(token).map_err(|err| {
        tracing::debug!(error = %err, path = %request.uri().path(), "Bearer token rejected");
        AuthError::AuthenticationFailed(INVALID_OR_EXPIRED_TOKEN)
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Admin routes: runs behind `gate` and additionally requires an active
/// superuser, who is attached to the request.
pub async fn require_superuser(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = request
        .extensions()
        .get::<Claims>()
        .map(|claims| claims.user_id)
        .ok_or(AuthError::NotAuthenticated)?;

    let user = state.directory.authorize_superuser(caller).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// `/` matches only the root, entries ending in `/` match by prefix and all
/// others must match exactly.
pub fn is_public_path(path: &str, allow_list: &[String]) -> bool {
    allow_list.iter().any(|entry| {
        if entry == "/" {
            path == "/"
        } else if entry.ends_with('/') {
            path.starts_with(entry.as_str())
        } else {
            path == entry
        }
    })
}

fn bearer_token(header_value: Option<&str>) -> AuthResult<&str> {
    let value = header_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::NotAuthenticated)?;
    parse_bearer_token(value).ok_or(AuthError::InvalidScheme)
}

/// Accepts the `Bearer` scheme in any letter case.
fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim_start();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn root_entry_matches_only_root() {
        let list = allow(&["/"]);
        assert!(is_public_path("/", &list));
        assert!(!is_public_path("/users/me", &list));
    }

    #[test]
    fn trailing_slash_entry_is_prefix() {
        let list = allow(&["/docs/", "/health"]);
        assert!(is_public_path("/docs/index.html", &list));
        assert!(is_public_path("/health", &list));
        assert!(!is_public_path("/health/deep", &list));
        assert!(!is_public_path("/docs", &list));
    }

    #[test]
    fn parse_bearer_token_is_case_insensitive() {
        assert_eq!(parse_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("BEARER   abc"), Some("abc"));
        assert_eq!(parse_bearer_token("Basic abc"), None);
        assert_eq!(parse_bearer_token("Bearer"), None);
    }

    #[test]
    fn bearer_token_classifies_failures() {
        assert!(matches!(bearer_token(None), Err(AuthError::NotAuthenticated)));
        assert!(matches!(
            bearer_token(Some("  ")),
            Err(AuthError::NotAuthenticated)
        ));
        assert!(matches!(
            bearer_token(Some("Basic dXNlcjpwdw==")),
            Err(AuthError::InvalidScheme)
        ));
        assert!(matches!(bearer_token(Some("Bearer tok")), Ok("tok")));
    }
}
