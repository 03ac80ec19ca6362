/// Time-based two-factor authentication
///
/// Each user is in one of three states, stored as
/// (`a2f_secret`, `a2f_enabled`) on the user record:
///
/// | State               | Secret | Enabled |
/// |---------------------|--------|---------|
/// | Disabled            | none   | false   |
/// | PendingVerification | some   | false   |
/// | Enabled             | some   | true    |
///
/// [`TwoFactorService::generate_secret`] moves any state to
/// PendingVerification (regenerating while Enabled resets the flag).
/// [`TwoFactorService::enable`] confirms a code and moves to Enabled.
/// [`TwoFactorService::disable`] returns to Disabled from anywhere.
///
/// Codes follow RFC 6238 with the parameters authenticator apps assume:
/// SHA-1, six digits, 30 second steps, one step of tolerance either side.
/// Input that is not exactly six ASCII digits is rejected before any TOTP
/// computation.
///
/// # Example
///
/// ```no_run
/// use memora_shared::auth::two_factor::TwoFactorService;
/// use memora_shared::store::Stores;
/// use uuid::Uuid;
///
/// # async fn example(user_id: Uuid, code: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let stores = Stores::in_memory();
/// let service = TwoFactorService::new(stores.users.clone(), "Memora Hub");
///
/// let provisioning = service.generate_secret(user_id, "alice@example.com").await?;
/// println!("scan {}", provisioning.otpauth_uri);
///
/// if service.enable(user_id, code).await? {
///     assert!(service.verify_code(user_id, code).await?);
/// }
/// # Ok(())
/// # }
/// ```

use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::store::{StoreError, UserStore};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Error type for two-factor setup
#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    /// Secret or account label rejected by the TOTP engine
    #[error("Invalid TOTP parameters: {0}")]
    Totp(String),

    #[error("Failed to render QR code: {0}")]
    QrCode(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What a user needs to register the secret in an authenticator app
#[derive(Debug, Clone, Serialize)]
pub struct A2fProvisioning {
    /// Base32 secret for manual entry
    pub secret: String,

    /// `otpauth://totp/...` URI
    pub otpauth_uri: String,

    /// PNG QR code of the URI as a `data:` URL
    pub qr_code: String,
}

/// Two-factor state transitions and code checks
#[derive(Clone)]
pub struct TwoFactorService {
    users: Arc<dyn UserStore>,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(users: Arc<dyn UserStore>, issuer: impl Into<String>) -> Self {
        Self {
            users,
            issuer: issuer.into(),
        }
    }

    /// Issues a fresh 160-bit secret and stores it, not yet enabled
    pub async fn generate_secret(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<A2fProvisioning, TwoFactorError> {
        let bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| TwoFactorError::Totp(format!("{:?}", e)))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            bytes,
            Some(self.issuer.clone()),
            email.to_string(),
        )
        .map_err(|e| TwoFactorError::Totp(e.to_string()))?;

        let secret = totp.get_secret_base32();
        let otpauth_uri = totp.get_url();
        let qr_code = render_qr_data_url(&otpauth_uri)?;

        if !self.users.set_a2f_state(user_id, Some(secret.clone()), false).await? {
            return Err(TwoFactorError::UserNotFound(user_id));
        }

        tracing::info!(user_id = %user_id, "Two-factor secret generated");

        Ok(A2fProvisioning {
            secret,
            otpauth_uri,
            qr_code,
        })
    }

    /// Confirms a code against the pending secret and turns two-factor on
    ///
    /// Returns false, changing nothing, when there is no secret, the code
    /// is wrong, or the secret was regenerated after the code was checked.
    pub async fn enable(&self, user_id: Uuid, code: &str) -> Result<bool, StoreError> {
        let Some(user) = self.users.find_user_by_id(user_id).await? else {
            return Ok(false);
        };
        let Some(secret) = user.a2f_secret.as_deref() else {
            tracing::debug!(user_id = %user_id, "Two-factor enable without a secret");
            return Ok(false);
        };

        if !code_matches(secret, code) {
            tracing::info!(user_id = %user_id, "Two-factor enable rejected: bad code");
            return Ok(false);
        }

        let enabled = self.users.enable_a2f(user_id, secret).await?;
        if enabled {
            tracing::info!(user_id = %user_id, "Two-factor enabled");
        } else {
            tracing::info!(user_id = %user_id, "Two-factor enable rejected: secret changed");
        }
        Ok(enabled)
    }

    /// Checks a login code; false unless two-factor is enabled
    pub async fn verify_code(&self, user_id: Uuid, code: &str) -> Result<bool, StoreError> {
        let Some(user) = self.users.find_user_by_id(user_id).await? else {
            return Ok(false);
        };

        match (user.a2f_enabled, user.a2f_secret.as_deref()) {
            (true, Some(secret)) => Ok(code_matches(secret, code)),
            _ => Ok(false),
        }
    }

    /// Clears the secret and the flag; safe to repeat
    pub async fn disable(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.users.set_a2f_state(user_id, None, false).await?;
        tracing::info!(user_id = %user_id, "Two-factor disabled");
        Ok(())
    }
}

/// Whether the input looks like a one-time code at all
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// Builds the TOTP checker for a stored base32 secret
pub fn totp_for_secret(secret: &str) -> Result<TOTP, TwoFactorError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| TwoFactorError::Totp(format!("{:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECONDS,
        bytes,
        None,
        String::new(),
    )
    .map_err(|e| TwoFactorError::Totp(e.to_string()))
}

fn code_matches(secret: &str, code: &str) -> bool {
    if !is_well_formed_code(code) {
        return false;
    }

    let totp = match totp_for_secret(secret) {
        Ok(totp) => totp,
        Err(e) => {
            tracing::warn!(error = %e, "Stored two-factor secret is unusable");
            return false;
        }
    };

    match totp.check_current(code) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!(error = %e, "System clock before Unix epoch");
            false
        }
    }
}

/// Renders `data` as a PNG QR code inside a `data:` URL
pub fn render_qr_data_url(data: &str) -> Result<String, TwoFactorError> {
    let code = QrCode::new(data).map_err(|e| TwoFactorError::QrCode(e.to_string()))?;
    let image = code.render::<Luma<u8>>().build();

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut buffer, image::ImageOutputFormat::Png)
        .map_err(|e| TwoFactorError::QrCode(e.to_string()))?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(buffer.get_ref())
    ))
}
