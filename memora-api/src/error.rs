/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; every core error converts into an
/// [`ApiError`] with `?`, and `ApiError` renders as
/// `{"error": code, "message": text, "details": [...]}`.
///
/// | Source error                     | Status |
/// |----------------------------------|--------|
/// | validation (`validator`)         | 422    |
/// | no or invalid session            | 401    |
/// | [`AuthzError`]                   | 403    |
/// | `StoreError::Conflict`           | 409    |
/// | storage or crypto failure        | 500    |
///
/// # Example
///
/// ```
/// use memora_api::error::{ApiError, ApiResult};
///
/// fn find(id: u32) -> ApiResult<u32> {
///     if id == 0 {
///         return Err(ApiError::NotFound("Group not found".to_string()));
///     }
///     Ok(id)
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use memora_shared::auth::guards::AuthzError;
use memora_shared::auth::jwt::JwtError;
use memora_shared::auth::password::PasswordError;
use memora_shared::auth::session::SessionError;
use memora_shared::auth::two_factor::TwoFactorError;
use memora_shared::store::StoreError;
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 400
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 401
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// 409, e.g. duplicate email or membership
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 422
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// 500; the message is logged, never returned
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `forbidden`
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(details)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) if constraint.contains("email") => {
                ApiError::Conflict("Email already registered".to_string())
            }
            StoreError::Conflict(constraint) if constraint.contains("group_memberships") => {
                ApiError::Conflict("User is already a member of this group".to_string())
            }
            StoreError::Conflict(constraint) => {
                ApiError::Conflict(format!("Constraint violation: {}", constraint))
            }
            StoreError::MissingReference(constraint) => {
                ApiError::NotFound(format!("Referenced record not found: {}", constraint))
            }
            StoreError::LastOwner(_) => {
                ApiError::Conflict("A group needs at least one owner".to_string())
            }
            StoreError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember(_) => ApiError::Forbidden("Not a member of this group".to_string()),
            AuthzError::MissingCapability { capability, .. } => {
                ApiError::Forbidden(format!("Missing permission: {}", capability))
            }
            AuthzError::InsufficientRole { required, .. } => {
                ApiError::Forbidden(format!("Requires role {} or higher", required))
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            _ => ApiError::Unauthorized("Invalid or expired credentials".to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Token(e) => e.into(),
            SessionError::Store(e) => e.into(),
        }
    }
}

impl From<TwoFactorError> for ApiError {
    fn from(err: TwoFactorError) -> Self {
        match err {
            TwoFactorError::UserNotFound(_) => ApiError::Unauthorized("Unknown user".to_string()),
            TwoFactorError::Store(e) => e.into(),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}
