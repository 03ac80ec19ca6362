/// User model and database operations
///
/// A user is an identity record with a global role, an account status and
/// the two-factor state. Group-scoped roles live in
/// [`GroupMembership`](super::membership::GroupMembership).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email TEXT NOT NULL,
///     password_hash TEXT NOT NULL,
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100) NOT NULL,
///     role TEXT NOT NULL DEFAULT 'collaborator',
///     status TEXT NOT NULL DEFAULT 'active',
///     a2f_secret TEXT,
///     a2f_enabled BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ,
///     CONSTRAINT users_a2f_secret_present CHECK (NOT a2f_enabled OR a2f_secret IS NOT NULL)
/// );
/// CREATE UNIQUE INDEX users_email_key ON users (LOWER(email));
/// ```
///
/// # Example
///
/// ```no_run
/// use memora_shared::auth::permissions::Role;
/// use memora_shared::models::user::{CreateUser, User};
/// use memora_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Alice".to_string(),
///     last_name: "Martin".to_string(),
///     role: Role::Collaborator,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "ALICE@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::permissions::Role;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Can sign in
    Active,

    /// Sign-in refused
    Inactive,
}

impl UserStatus {
    /// Converts status to its storage form
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Parses a stored status; anything unknown is inactive
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => UserStatus::Active,
            _ => UserStatus::Inactive,
        }
    }
}

/// User account
///
/// `password_hash` and `a2f_secret` are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address, stored lowercase
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    /// Global role (group roles are separate)
    pub role: Role,

    pub status: UserStatus,

    /// Base32 TOTP secret
    ///
    /// Always present when `a2f_enabled` is true.
    #[serde(skip_serializing, default)]
    pub a2f_secret: Option<String>,

    /// Whether login requires a one-time code
    pub a2f_enabled: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// When the user last logged in (None if never)
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Display name built from first and last name
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Whether the account may sign in
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Raw database row; roles and status are stored as text
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    status: String,
    a2f_secret: Option<String>,
    a2f_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = Role::parse(&row.role).unwrap_or_else(|| {
            tracing::warn!(user_id = %row.id, role = %row.role, "Unknown global role, using guest");
            Role::Guest
        });

        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            status: UserStatus::parse(&row.status),
            a2f_secret: row.a2f_secret,
            a2f_enabled: row.a2f_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address (normalized to lowercase on insert)
    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    /// Global role
    pub role: Role,
}

/// Normalizes an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, status, \
                            a2f_secret, a2f_enabled, created_at, updated_at, last_login_at";

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email already exists (unique index violation)
    /// or the database is unreachable.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(normalize_email(&data.email))
            .bind(data.password_hash)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.role.as_str())
            .fetch_one(pool)
            .await?;

        Ok(row.into())
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = $1");

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Updates last login timestamp
    ///
    /// Returns true if the user exists.
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Activates or deactivates an account
    pub async fn set_status(pool: &PgPool, id: Uuid, status: UserStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Writes the two-factor fields in one statement
    ///
    /// Only the two-factor service calls this. The table's CHECK constraint
    /// rejects `enabled = true` with no secret.
    pub async fn set_a2f_state(
        pool: &PgPool,
        id: Uuid,
        secret: Option<&str>,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET a2f_secret = $2, a2f_enabled = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(secret)
        .bind(enabled)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Enables two-factor only if the stored secret is still `expected_secret`
    ///
    /// Returns false when no row matched (unknown user, no secret, or a
    /// secret replaced in the meantime).
    pub async fn enable_a2f(
        pool: &PgPool,
        id: Uuid,
        expected_secret: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET a2f_enabled = TRUE, updated_at = NOW()
            WHERE id = $1 AND a2f_secret = $2
            "#,
        )
        .bind(id)
        .bind(expected_secret)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
