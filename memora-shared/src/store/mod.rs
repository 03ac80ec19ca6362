/// Persistence interfaces
///
/// The auth core and the HTTP handlers talk to storage only through these
/// traits. Two implementations exist:
///
/// - [`postgres::PgStore`]: sqlx/PostgreSQL, delegating to the queries in
///   [`models`](crate::models)
/// - [`memory::MemoryStore`]: in-process maps behind a `tokio` lock, used by
///   tests and local demos
///
/// Each method is a single-record operation whose atomicity is provided by
/// the backend; nothing in the core spans a multi-step transaction.
///
/// # Example
///
/// ```
/// use memora_shared::store::Stores;
///
/// let stores = Stores::in_memory();
/// let _users = stores.users.clone();
/// ```

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::permissions::Role;
use crate::models::membership::{CreateGroup, Group, GroupMembership, UpdateGroup};
use crate::models::project::{CreateProject, Project, UpdateProject};
use crate::models::session::{CreateSession, Session};
use crate::models::task::{CreateTask, Task, UpdateTask};
use crate::models::user::{CreateUser, User, UserStatus};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint violated (duplicate email, membership, token)
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Referenced record does not exist
    #[error("Referenced record not found: {0}")]
    MissingReference(String),

    /// The change would leave the group without an owner
    #[error("Group {0} would be left without an owner")]
    LastOwner(Uuid),

    /// Backend failure; fatal for the current request
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => return StoreError::Conflict(constraint),
                // foreign_key_violation
                Some("23503") => return StoreError::MissingReference(constraint),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

/// Result alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// User records
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Case-insensitive lookup
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Stamps `last_login_at`
    async fn record_login(&self, id: Uuid) -> StoreResult<()>;

    /// Returns false if the user does not exist
    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> StoreResult<bool>;

    /// Overwrites both two-factor fields
    ///
    /// Returns false if the user does not exist. Callers must not pass
    /// `enabled = true` with no secret.
    async fn set_a2f_state(&self, id: Uuid, secret: Option<String>, enabled: bool)
        -> StoreResult<bool>;

    /// Sets `a2f_enabled` if and only if the stored secret equals
    /// `expected_secret`
    ///
    /// Returns false, changing nothing, when the secret was replaced or
    /// cleared since the caller read it.
    async fn enable_a2f(&self, id: Uuid, expected_secret: &str) -> StoreResult<bool>;
}

/// Groups and memberships
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Creates a group with its creator as Owner
    async fn create_group(&self, data: CreateGroup) -> StoreResult<Group>;

    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>>;

    async fn list_groups_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Group>>;

    async fn update_group(&self, id: Uuid, data: UpdateGroup) -> StoreResult<Option<Group>>;

    /// Deletes the group with its memberships, projects and tasks
    async fn delete_group(&self, id: Uuid) -> StoreResult<bool>;

    /// Fails with [`StoreError::Conflict`] if the pair already exists
    async fn add_member(&self, group_id: Uuid, user_id: Uuid, role: Role)
        -> StoreResult<GroupMembership>;

    /// Fails with [`StoreError::LastOwner`] when demoting the only owner;
    /// the check and the write are atomic
    async fn update_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> StoreResult<Option<GroupMembership>>;

    /// Fails with [`StoreError::LastOwner`] when removing the only owner
    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    async fn list_members(&self, group_id: Uuid) -> StoreResult<Vec<GroupMembership>>;

    async fn memberships_for_user(&self, user_id: Uuid) -> StoreResult<Vec<GroupMembership>>;
}

/// Persisted sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, data: CreateSession) -> StoreResult<Session>;

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>>;

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool>;

    async fn delete_sessions_by_token(&self, token: &str) -> StoreResult<u64>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    async fn delete_expired_sessions(&self) -> StoreResult<u64>;
}

/// Projects and tasks
#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn create_project(&self, data: CreateProject) -> StoreResult<Project>;

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>>;

    async fn list_projects(&self, group_id: Uuid) -> StoreResult<Vec<Project>>;

    async fn update_project(&self, id: Uuid, data: UpdateProject) -> StoreResult<Option<Project>>;

    /// Deletes the project and its tasks
    async fn delete_project(&self, id: Uuid) -> StoreResult<bool>;

    async fn create_task(&self, data: CreateTask) -> StoreResult<Task>;

    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>>;

    async fn list_tasks(&self, project_id: Uuid) -> StoreResult<Vec<Task>>;

    async fn update_task(&self, id: Uuid, data: UpdateTask) -> StoreResult<Option<Task>>;

    async fn delete_task(&self, id: Uuid) -> StoreResult<bool>;
}

/// Bundle of store handles shared through application state
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub groups: Arc<dyn GroupStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub work: Arc<dyn WorkStore>,
}

impl Stores {
    /// Stores backed by PostgreSQL
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            groups: store.clone(),
            sessions: store.clone(),
            work: store,
        }
    }

    /// Stores backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(memory::MemoryStore::new()))
    }

    /// Stores sharing an existing in-memory store
    pub fn from_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            groups: store.clone(),
            sessions: store.clone(),
            work: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Conflict("users_email_key".to_string());
        assert!(err.to_string().contains("users_email_key"));

        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
