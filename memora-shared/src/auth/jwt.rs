/// Signed session tokens
///
/// Session and login-challenge tokens are JWTs signed with HS256. The
/// payload identifies the user and carries the global role for display; it
/// never contains the password hash or the two-factor secret.
///
/// # Claims
///
/// - `sub`: user ID
/// - `email`, `role`: identity snapshot at sign-in
/// - `iss`: always `"memora-hub"`
/// - `iat`, `nbf`, `exp`: issue, not-before and expiry (Unix seconds)
/// - `jti`: random ID, so two tokens signed in the same second differ
/// - `kind`: [`TokenKind::Session`] or [`TokenKind::A2fChallenge`]
///
/// A signature that checks out says nothing about revocation. Session
/// validity also requires the matching row in the session store; see
/// [`SessionManager`](super::session::SessionManager).
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use memora_shared::auth::jwt::{sign_token, verify_token, SessionPayload, TokenKind};
/// use memora_shared::auth::permissions::Role;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "a-very-long-secret-of-at-least-32-bytes";
/// let payload = SessionPayload {
///     user_id: Uuid::new_v4(),
///     email: "alice@example.com".to_string(),
///     role: Role::Collaborator,
///     kind: TokenKind::Session,
/// };
///
/// let token = sign_token(&payload, secret, Duration::days(7))?;
/// assert_eq!(verify_token(&token, secret), Some(payload));
/// assert_eq!(verify_token(&token, "another-secret-of-at-least-32-bytes"), None);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permissions::Role;

/// Issuer written into and required from every token
pub const ISSUER: &str = "memora-hub";

/// Default session lifetime
pub fn default_session_ttl() -> Duration {
    Duration::days(7)
}

/// Lifetime of the token bridging password check and one-time code
pub fn challenge_ttl() -> Duration {
    Duration::minutes(5)
}

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, issuer or format check failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token is valid but of another kind than expected
    #[error("Unexpected token kind: {0:?}")]
    WrongKind(TokenKind),
}

/// What a token is good for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Authenticated session
    Session,

    /// Password accepted, one-time code still owed
    A2fChallenge,
}

/// Identity carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
}

/// Raw JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: Uuid,
    pub kind: TokenKind,
}

impl Claims {
    /// Builds claims for a payload, valid from `issued_at` for `ttl`
    pub fn new(payload: &SessionPayload, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: payload.user_id,
            email: payload.email.clone(),
            role: payload.role,
            iss: ISSUER.to_string(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: Uuid::new_v4(),
            kind: payload.kind,
        }
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn payload(&self) -> SessionPayload {
        SessionPayload {
            user_id: self.sub,
            email: self.email.clone(),
            role: self.role,
            kind: self.kind,
        }
    }
}

/// Signs prepared claims
pub fn encode_claims(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Signs a token for `payload` valid for `ttl` from now
pub fn sign_token(payload: &SessionPayload, secret: &str, ttl: Duration) -> Result<String, JwtError> {
    encode_claims(&Claims::new(payload, Utc::now(), ttl), secret)
}

/// Decodes and validates a token, keeping the reason for failure
///
/// Checks signature, issuer, `exp` and `nbf` with no leeway.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::ValidationError(e.to_string()),
    })?;

    Ok(token_data.claims)
}

/// Verifies a token of any kind
///
/// `None` on bad signature, wrong issuer, expiry or malformed input.
pub fn verify_token(token: &str, secret: &str) -> Option<SessionPayload> {
    match decode_claims(token, secret) {
        Ok(claims) => Some(claims.payload()),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected token");
            None
        }
    }
}

/// Decodes a token and requires a specific kind
pub fn decode_claims_of_kind(token: &str, secret: &str, kind: TokenKind) -> Result<Claims, JwtError> {
    let claims = decode_claims(token, secret)?;
    if claims.kind != kind {
        return Err(JwtError::WrongKind(claims.kind));
    }
    Ok(claims)
}

/// Signs a short-lived two-factor challenge for a user
pub fn sign_challenge(
    user_id: Uuid,
    email: &str,
    role: Role,
    secret: &str,
) -> Result<String, JwtError> {
    let payload = SessionPayload {
        user_id,
        email: email.to_string(),
        role,
        kind: TokenKind::A2fChallenge,
    };
    sign_token(&payload, secret, challenge_ttl())
}

/// Verifies a two-factor challenge token
pub fn verify_challenge(token: &str, secret: &str) -> Option<SessionPayload> {
    decode_claims_of_kind(token, secret, TokenKind::A2fChallenge)
        .map(|claims| claims.payload())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn payload(kind: TokenKind) -> SessionPayload {
        SessionPayload {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            role: Role::Manager,
            kind,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let payload = payload(TokenKind::Session);
        let token = sign_token(&payload, SECRET, default_session_ttl()).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(verify_token(&token, SECRET), Some(payload));
    }

    #[test]
    fn test_default_expiry_is_seven_days() {
        let claims = Claims::new(&payload(TokenKind::Session), Utc::now(), default_session_ttl());
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn test_tokens_are_unique() {
        let payload = payload(TokenKind::Session);
        let a = sign_token(&payload, SECRET, default_session_ttl()).unwrap();
        let b = sign_token(&payload, SECRET, default_session_ttl()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_token(&payload(TokenKind::Session), SECRET, default_session_ttl()).unwrap();
        assert!(verify_token(&token, "wrong-secret-key-at-least-32-bytes-long").is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sign_token(&payload(TokenKind::Session), SECRET, Duration::seconds(-10)).unwrap();

        assert!(verify_token(&token, SECRET).is_none());
        assert!(matches!(decode_claims(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut claims = Claims::new(&payload(TokenKind::Session), Utc::now(), default_session_ttl());
        claims.iss = "someone-else".to_string();
        let token = encode_claims(&claims, SECRET).unwrap();

        assert!(verify_token(&token, SECRET).is_none());
    }

    #[test]
    fn test_malformed_input_rejected() {
        for garbage in ["", "not-a-jwt", "a.b.c", "...."] {
            assert!(verify_token(garbage, SECRET).is_none());
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign_token(&payload(TokenKind::Session), SECRET, default_session_ttl()).unwrap();
        let other = sign_token(&payload(TokenKind::Session), SECRET, default_session_ttl()).unwrap();

        // body of one token with the signature of another
        let parts: Vec<&str> = token.split('.').collect();
        let other_body = other.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", parts[0], other_body, parts[2]);

        assert!(verify_token(&spliced, SECRET).is_none());
    }

    #[test]
    fn test_challenge_kind_is_enforced() {
        let session = sign_token(&payload(TokenKind::Session), SECRET, default_session_ttl()).unwrap();
        assert!(verify_challenge(&session, SECRET).is_none());

        let user_id = Uuid::new_v4();
        let challenge = sign_challenge(user_id, "bob@example.com", Role::Guest, SECRET).unwrap();
        let verified = verify_challenge(&challenge, SECRET).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert_eq!(verified.kind, TokenKind::A2fChallenge);

        assert!(matches!(
            decode_claims_of_kind(&challenge, SECRET, TokenKind::Session),
            Err(JwtError::WrongKind(TokenKind::A2fChallenge))
        ));
    }

    #[test]
    fn test_claims_never_carry_secrets() {
        let token = sign_token(&payload(TokenKind::Session), SECRET, default_session_ttl()).unwrap();
        let claims = decode_claims(&token, SECRET).unwrap();
        let json = serde_json::to_value(&claims).unwrap();

        assert!(json.get("password_hash").is_none());
        assert!(json.get("a2f_secret").is_none());
        assert_eq!(json["kind"], "session");
    }
}
