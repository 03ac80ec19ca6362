/// Request extractors
///
/// [`SessionUser`] is the authenticated caller. Taking it as a handler
/// argument makes the route require a live session: the cookie token must
/// verify, its session row must exist unexpired, and the user must still be
/// active. Any failure rejects the request with 401.
///
/// ```no_run
/// use axum::Json;
/// use memora_api::extract::SessionUser;
///
/// async fn whoami(caller: SessionUser) -> Json<String> {
///     Json(caller.email.clone())
/// }
/// ```

use std::ops::Deref;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use memora_shared::auth::guards::CurrentUser;
use memora_shared::models::user::User;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated user of the current request
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// Full account record
    pub user: User,

    /// Identity and memberships used by the permission guards
    pub current: CurrentUser,
}

impl Deref for SessionUser {
    type Target = CurrentUser;

    fn deref(&self) -> &CurrentUser {
        &self.current
    }
}

fn unauthenticated() -> ApiError {
    ApiError::Unauthorized("Authentication required".to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let payload = state
            .sessions
            .get_session(&jar)
            .await?
            .ok_or_else(unauthenticated)?;

        let user = state
            .stores
            .users
            .find_user_by_id(payload.user_id)
            .await?
            .ok_or_else(unauthenticated)?;

        if !user.is_active() {
            tracing::info!(user_id = %user.id, "Session of inactive user rejected");
            return Err(unauthenticated());
        }

        let memberships = state.stores.groups.memberships_for_user(user.id).await?;
        let current = CurrentUser::new(&user, memberships);

        Ok(SessionUser { user, current })
    }
}
