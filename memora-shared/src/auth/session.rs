/// Cookie-backed sessions
///
/// A session is a signed token ([`jwt`](super::jwt)) plus a row in the
/// [`SessionStore`]. The token travels in the `memora_session` cookie; the
/// row makes it revocable. A request is authenticated only when both agree:
/// the signature and expiry check out and the row still exists unexpired.
///
/// Each login creates a new row, so a user may hold several sessions at
/// once (one per device). Logout deletes the rows for the presented token
/// only.
///
/// Invalid, malformed or expired credentials are reported as `Ok(None)`;
/// only storage failures are errors.
///
/// # Example
///
/// ```no_run
/// use axum_extra::extract::cookie::CookieJar;
/// use memora_shared::auth::session::{SessionConfig, SessionManager};
/// use memora_shared::models::user::User;
/// use memora_shared::store::Stores;
///
/// # async fn example(alice: User) -> Result<(), Box<dyn std::error::Error>> {
/// let stores = Stores::in_memory();
/// let manager = SessionManager::new(
///     stores.sessions.clone(),
///     SessionConfig::new("a-very-long-secret-of-at-least-32-bytes"),
/// );
///
/// let (jar, _token) = manager
///     .create_session(CookieJar::new(), alice.id, &alice.email, alice.role)
///     .await?;
/// let payload = manager.get_session(&jar).await?;
/// assert_eq!(payload.map(|p| p.user_id), Some(alice.id));
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use uuid::Uuid;

use super::jwt::{self, Claims, JwtError, SessionPayload, TokenKind};
use super::permissions::Role;
use crate::models::session::CreateSession;
use crate::store::{SessionStore, StoreError};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "memora_session";

/// Name of the cookie holding a pending two-factor challenge
pub const CHALLENGE_COOKIE: &str = "memora_a2f";

/// Error type for session creation
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC signing secret
    pub secret: String,

    /// Session lifetime (cookie max-age and row expiry)
    pub ttl: Duration,

    /// Mark cookies `Secure` (production)
    pub secure: bool,
}

impl SessionConfig {
    /// Seven-day, non-secure sessions
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: jwt::default_session_ttl(),
            secure: false,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Creates, validates and ends sessions
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts a session and sets its cookie
    ///
    /// Returns the updated jar and the raw token.
    pub async fn create_session(
        &self,
        jar: CookieJar,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(CookieJar, String), SessionError> {
        let payload = SessionPayload {
            user_id,
            email: email.to_string(),
            role,
            kind: TokenKind::Session,
        };
        let claims = Claims::new(&payload, Utc::now(), self.config.ttl);
        let token = jwt::encode_claims(&claims, &self.config.secret)?;

        let session = self
            .store
            .insert_session(CreateSession {
                user_id,
                token: token.clone(),
                expires_at: claims.expires_at(),
            })
            .await?;

        tracing::info!(user_id = %user_id, session_id = %session.id, "Session created");

        let jar = jar.add(self.session_cookie(token.clone()));
        Ok((jar, token))
    }

    /// Returns the payload of the session in the jar, if it is valid
    pub async fn get_session(&self, jar: &CookieJar) -> Result<Option<SessionPayload>, StoreError> {
        match jar.get(SESSION_COOKIE) {
            Some(cookie) => self.validate_token(cookie.value()).await,
            None => Ok(None),
        }
    }

    /// Validates a raw session token against signature and store
    ///
    /// Expired rows found along the way are deleted.
    pub async fn validate_token(&self, token: &str) -> Result<Option<SessionPayload>, StoreError> {
        let claims = match jwt::decode_claims_of_kind(token, &self.config.secret, TokenKind::Session) {
            Ok(claims) => claims,
            Err(JwtError::Expired) => {
                let removed = self.store.delete_sessions_by_token(token).await?;
                if removed > 0 {
                    tracing::debug!(removed, "Removed session with expired token");
                }
                return Ok(None);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Invalid session token");
                return Ok(None);
            }
        };

        let Some(session) = self.store.find_session_by_token(token).await? else {
            tracing::debug!(user_id = %claims.sub, "No session row for token");
            return Ok(None);
        };

        if session.is_expired() {
            self.store.delete_session(session.id).await?;
            tracing::debug!(session_id = %session.id, "Removed expired session");
            return Ok(None);
        }

        if session.user_id != claims.sub {
            tracing::warn!(session_id = %session.id, "Session row does not match token subject");
            return Ok(None);
        }

        Ok(Some(claims.payload()))
    }

    /// Ends the session in the jar and clears the cookie
    ///
    /// Deleting an unknown or already-deleted session is not an error.
    pub async fn delete_session(&self, jar: CookieJar) -> Result<CookieJar, StoreError> {
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            let removed = self.store.delete_sessions_by_token(cookie.value()).await?;
            tracing::info!(removed, "Session deleted");
        }

        Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
    }

    /// Ends every session of a user
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let removed = self.store.delete_sessions_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, removed, "All sessions deleted");
        Ok(removed)
    }

    /// Deletes expired session rows
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let removed = self.store.delete_expired_sessions().await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    /// Sets a two-factor challenge cookie for a user whose password checked out
    pub fn start_challenge(
        &self,
        jar: CookieJar,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<CookieJar, JwtError> {
        let token = jwt::sign_challenge(user_id, email, role, &self.config.secret)?;
        let cookie = Cookie::build((CHALLENGE_COOKIE, token))
            .http_only(true)
            .secure(self.config.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(to_cookie_duration(jwt::challenge_ttl()));

        Ok(jar.add(cookie))
    }

    /// Reads the pending two-factor challenge, if valid
    pub fn pending_challenge(&self, jar: &CookieJar) -> Option<SessionPayload> {
        let cookie = jar.get(CHALLENGE_COOKIE)?;
        jwt::verify_challenge(cookie.value(), &self.config.secret)
    }

    /// Removes the challenge cookie
    pub fn clear_challenge(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(CHALLENGE_COOKIE).path("/"))
    }

    fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .secure(self.config.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(to_cookie_duration(self.config.ttl))
            .build()
    }
}

fn to_cookie_duration(ttl: Duration) -> time::Duration {
    time::Duration::seconds(ttl.num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::CreateUser;
    use crate::store::memory::MemoryStore;
    use crate::store::UserStore;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    async fn setup() -> (Arc<MemoryStore>, SessionManager, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(CreateUser {
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Alice".to_string(),
                last_name: "Martin".to_string(),
                role: Role::Manager,
            })
            .await
            .unwrap();
        let manager = SessionManager::new(store.clone(), SessionConfig::new(SECRET));
        (store, manager, user.id)
    }

    fn jar_with(token: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(SESSION_COOKIE, token.to_string()))
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (_store, manager, user_id) = setup().await;

        let (jar, _token) = manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();

        let payload = manager.get_session(&jar).await.unwrap().unwrap();
        assert_eq!(payload.user_id, user_id);
        assert_eq!(payload.email, "alice@example.com");
        assert_eq!(payload.role, Role::Manager);
        assert_eq!(payload.kind, TokenKind::Session);
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let (_store, manager, user_id) = setup().await;

        let (jar, token) = manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();

        let cookie = jar.get(SESSION_COOKIE).unwrap();
        assert_eq!(cookie.value(), token);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(604_800)));
        assert_ne!(cookie.secure(), Some(true));
    }

    #[tokio::test]
    async fn test_secure_cookie_in_production() {
        let (store, _manager, user_id) = setup().await;
        let manager = SessionManager::new(store, SessionConfig::new(SECRET).with_secure(true));

        let (jar, _) = manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();

        assert_eq!(jar.get(SESSION_COOKIE).unwrap().secure(), Some(true));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (store, manager, user_id) = setup().await;
        let (jar, token) = manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();

        manager.delete_session(jar).await.unwrap();

        // the same token presented again finds nothing
        let again = jar_with(&token);
        assert!(manager.get_session(&again).await.unwrap().is_none());
        assert_eq!(store.session_count().await, 0);

        // idempotent
        manager.delete_session(again).await.unwrap();
        manager.delete_session(CookieJar::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_row_is_removed() {
        let (store, manager, user_id) = setup().await;

        // token still valid, row already expired
        let payload = SessionPayload {
            user_id,
            email: "alice@example.com".to_string(),
            role: Role::Manager,
            kind: TokenKind::Session,
        };
        let token = jwt::sign_token(&payload, SECRET, Duration::days(7)).unwrap();
        store
            .insert_session(CreateSession {
                user_id,
                token: token.clone(),
                expires_at: Utc::now() - Duration::minutes(1),
            })
            .await
            .unwrap();

        assert!(manager.get_session(&jar_with(&token)).await.unwrap().is_none());
        assert!(store.find_session_by_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_removes_row() {
        let (store, manager, user_id) = setup().await;
        let manager_short = SessionManager::new(
            store.clone(),
            SessionConfig::new(SECRET).with_ttl(Duration::seconds(-5)),
        );

        let (jar, token) = manager_short
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();

        assert!(manager.get_session(&jar).await.unwrap().is_none());
        assert!(store.find_session_by_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_without_row_is_rejected() {
        let (_store, manager, user_id) = setup().await;
        let payload = SessionPayload {
            user_id,
            email: "alice@example.com".to_string(),
            role: Role::Owner,
            kind: TokenKind::Session,
        };
        let token = jwt::sign_token(&payload, SECRET, Duration::days(7)).unwrap();

        assert!(manager.get_session(&jar_with(&token)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_cookie_is_none() {
        let (_store, manager, _user_id) = setup().await;

        assert!(manager.get_session(&CookieJar::new()).await.unwrap().is_none());
        assert!(manager.get_session(&jar_with("garbage")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_sessions_per_user() {
        let (store, manager, user_id) = setup().await;

        let (laptop, _) = manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();
        let (phone, _) = manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();
        assert_eq!(store.session_count().await, 2);

        manager.delete_session(laptop.clone()).await.unwrap();
        assert!(manager.get_session(&laptop).await.unwrap().is_none());
        assert!(manager.get_session(&phone).await.unwrap().is_some());

        assert_eq!(manager.delete_all_for_user(user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_challenge_is_not_a_session() {
        let (_store, manager, user_id) = setup().await;

        let jar = manager
            .start_challenge(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .unwrap();
        let challenge = jar.get(CHALLENGE_COOKIE).unwrap().value().to_string();

        assert_eq!(manager.pending_challenge(&jar).map(|p| p.user_id), Some(user_id));
        assert!(manager.get_session(&jar_with(&challenge)).await.unwrap().is_none());

        let jar = manager.clear_challenge(jar);
        assert!(manager.pending_challenge(&jar).is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, manager, user_id) = setup().await;
        store
            .insert_session(CreateSession {
                user_id,
                token: "stale".to_string(),
                expires_at: Utc::now() - Duration::hours(1),
            })
            .await
            .unwrap();
        manager
            .create_session(CookieJar::new(), user_id, "alice@example.com", Role::Manager)
            .await
            .unwrap();

        assert_eq!(manager.purge_expired().await.unwrap(), 1);
        assert_eq!(store.session_count().await, 1);
    }
}
