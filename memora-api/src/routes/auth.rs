/// Authentication endpoints
///
/// - `POST /v1/auth/register`: create an account and sign in
/// - `POST /v1/auth/login`: password login, possibly followed by a code
/// - `POST /v1/auth/a2f/verify`: second step of a two-factor login
/// - `POST /v1/auth/logout`: end the current session
/// - `GET  /v1/auth/me`: the signed-in user and their memberships
///
/// A successful sign-in answers with the user and sets the `memora_session`
/// cookie. When the account has two-factor enabled, `login` instead answers
/// `{"a2f_required": true}` and sets a short-lived `memora_a2f` challenge
/// cookie that `a2f/verify` exchanges for a session.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::CookieJar;
use memora_shared::auth::password;
use memora_shared::auth::permissions::Role;
use memora_shared::models::membership::GroupMembership;
use memora_shared::models::user::{normalize_email, CreateUser, User};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::SessionUser,
};

/// Same answer for unknown email and wrong password
const BAD_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked for strength after field validation
    #[validate(length(max = 128, message = "Password must be at most 128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// One-time code from an authenticator app
#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

/// Body of register, login and a2f/verify
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// True when a code must be sent to `a2f/verify` before a session exists
    pub a2f_required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl AuthResponse {
    fn signed_in(user: User) -> Self {
        Self {
            a2f_required: false,
            user: Some(user),
        }
    }

    fn challenge() -> Self {
        Self {
            a2f_required: true,
            user: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub memberships: Vec<GroupMembership>,
}

/// Registers a user with the global role Collaborator and signs them in
///
/// # Errors
///
/// - `422`: invalid fields or weak password
/// - `409`: email already registered
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    req.validate()?;
    password::validate_password_strength(&req.password)
        .map_err(|message| ApiError::invalid_field("password", message))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = state
        .stores
        .users
        .create_user(CreateUser {
            email: normalize_email(&req.email),
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            role: Role::Collaborator,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    state.stores.users.record_login(user.id).await?;
    let (jar, _token) = state
        .sessions
        .create_session(jar, user.id, &user.email, user.role)
        .await?;

    Ok((StatusCode::CREATED, jar, Json(AuthResponse::signed_in(user))))
}

/// Checks email and password
///
/// # Errors
///
/// - `401`: unknown email or wrong password
/// - `403`: account inactive
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    req.validate()?;

    let user = state
        .stores
        .users
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Login rejected: bad password");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    if !user.is_active() {
        tracing::info!(user_id = %user.id, "Login rejected: inactive account");
        return Err(ApiError::Forbidden("Account is inactive".to_string()));
    }

    if user.a2f_enabled {
        let jar = state
            .sessions
            .start_challenge(jar, user.id, &user.email, user.role)?;
        tracing::info!(user_id = %user.id, "Two-factor challenge issued");
        return Ok((jar, Json(AuthResponse::challenge())));
    }

    let jar = sign_in(&state, jar, &user).await?;
    Ok((jar, Json(AuthResponse::signed_in(user))))
}

/// Completes a two-factor login
///
/// # Errors
///
/// - `401`: no valid challenge cookie, or wrong code
/// - `422`: code is not six characters
pub async fn verify_a2f(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CodeRequest>,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    req.validate()?;

    let pending = state
        .sessions
        .pending_challenge(&jar)
        .ok_or_else(|| ApiError::Unauthorized("No pending two-factor challenge".to_string()))?;

    if !state.two_factor.verify_code(pending.user_id, &req.code).await? {
        tracing::info!(user_id = %pending.user_id, "Two-factor login rejected: bad code");
        return Err(ApiError::Unauthorized("Invalid verification code".to_string()));
    }

    let user = state
        .stores
        .users
        .find_user_by_id(pending.user_id)
        .await?
        .filter(User::is_active)
        .ok_or_else(|| ApiError::Unauthorized("Account is no longer available".to_string()))?;

    let jar = state.sessions.clear_challenge(jar);
    let jar = sign_in(&state, jar, &user).await?;
    Ok((jar, Json(AuthResponse::signed_in(user))))
}

/// Ends the session carried by the request; repeating it is harmless
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(StatusCode, CookieJar)> {
    let jar = state.sessions.delete_session(jar).await?;
    Ok((StatusCode::NO_CONTENT, jar))
}

pub async fn me(caller: SessionUser) -> Json<MeResponse> {
    Json(MeResponse {
        memberships: caller.current.memberships,
        user: caller.user,
    })
}

async fn sign_in(state: &AppState, jar: CookieJar, user: &User) -> ApiResult<CookieJar> {
    state.stores.users.record_login(user.id).await?;
    let (jar, _token) = state
        .sessions
        .create_session(jar, user.id, &user.email, user.role)
        .await?;

    tracing::info!(user_id = %user.id, "User signed in");
    Ok(jar)
}
