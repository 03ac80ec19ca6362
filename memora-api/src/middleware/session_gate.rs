/// Request gate for authenticated routes
///
/// Runs in front of every route. Paths in [`PUBLIC_PATHS`] pass straight
/// through; anything else needs a `memora_session` cookie whose token has a
/// valid signature, the session kind and an unexpired `exp`.
///
/// The gate does no store I/O. A revoked session with a still-valid token
/// gets past it and is rejected by the [`SessionUser`](crate::extract::SessionUser)
/// extractor, which checks the session row.
///
/// Rejections:
///
/// - browsers (`Accept: text/html`) get `303 See Other` to `/login`
/// - API clients get a `401` JSON error

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use memora_shared::auth::jwt::{self, TokenKind};
use memora_shared::auth::session::SESSION_COOKIE;

use crate::app::AppState;
use crate::error::ApiError;

/// Paths reachable without a session
pub const PUBLIC_PATHS: [&str; 4] = [
    "/health",
    "/v1/auth/login",
    "/v1/auth/register",
    "/v1/auth/a2f/verify",
];

/// Where browsers are sent to sign in
pub const LOGIN_PAGE: &str = "/login";

/// Whether a path skips the session check
pub fn is_public(path: &str) -> bool {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    PUBLIC_PATHS.contains(&path)
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Middleware function, installed with `axum::middleware::from_fn_with_state`
pub async fn session_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let secret = &state.sessions.config().secret;
    let authenticated = jar
        .get(SESSION_COOKIE)
        .map(|cookie| jwt::decode_claims_of_kind(cookie.value(), secret, TokenKind::Session))
        .is_some_and(|claims| claims.is_ok());

    if authenticated {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Request without a valid session");

    if wants_html(request.headers()) {
        Redirect::to(LOGIN_PAGE).into_response()
    } else {
        ApiError::Unauthorized("Authentication required".to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/health"));
        assert!(is_public("/v1/auth/login"));
        assert!(is_public("/v1/auth/register/"));
        assert!(is_public("/v1/auth/a2f/verify"));

        assert!(!is_public("/"));
        assert!(!is_public("/v1/auth/me"));
        assert!(!is_public("/v1/auth/a2f/setup"));
        assert!(!is_public("/v1/auth/login/../../groups"));
        assert!(!is_public("/healthz"));
    }

    #[test]
    fn test_wants_html() {
        let mut headers = HeaderMap::new();
        assert!(!wants_html(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_html(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9"),
        );
        assert!(wants_html(&headers));
    }
}
