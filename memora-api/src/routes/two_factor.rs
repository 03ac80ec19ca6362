/// Two-factor management for the signed-in user
///
/// ```text
/// POST /v1/auth/a2f/setup     -> secret, otpauth URI, QR code
/// POST /v1/auth/a2f/enable    {"code": "123456"}
/// POST /v1/auth/a2f/disable
/// ```
///
/// `setup` may be called again at any time; it replaces the secret and
/// leaves two-factor off until `enable` confirms a code from the new one.

use axum::{extract::State, Json};
use memora_shared::auth::two_factor::A2fProvisioning;
use serde::Serialize;
use validator::Validate;

use super::auth::CodeRequest;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::SessionUser,
};

#[derive(Debug, Serialize)]
pub struct A2fStatus {
    pub a2f_enabled: bool,
}

pub async fn setup(
    State(state): State<AppState>,
    caller: SessionUser,
) -> ApiResult<Json<A2fProvisioning>> {
    let provisioning = state
        .two_factor
        .generate_secret(caller.id, &caller.email)
        .await?;

    Ok(Json(provisioning))
}

/// # Errors
///
/// `400` when the code does not match the pending secret, or no secret
/// was generated.
pub async fn enable(
    State(state): State<AppState>,
    caller: SessionUser,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<A2fStatus>> {
    req.validate()?;

    if !state.two_factor.enable(caller.id, &req.code).await? {
        return Err(ApiError::BadRequest("Invalid verification code".to_string()));
    }

    Ok(Json(A2fStatus { a2f_enabled: true }))
}

pub async fn disable(
    State(state): State<AppState>,
    caller: SessionUser,
) -> ApiResult<Json<A2fStatus>> {
    state.two_factor.disable(caller.id).await?;
    Ok(Json(A2fStatus { a2f_enabled: false }))
}
