/// PostgreSQL store
///
/// Thin adapter from the store traits to the model queries.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{GroupStore, SessionStore, StoreError, StoreResult, UserStore, WorkStore};
use crate::auth::permissions::Role;
use crate::models::membership::{CreateGroup, Group, GroupMembership, OwnerGuarded, UpdateGroup};
use crate::models::project::{CreateProject, Project, UpdateProject};
use crate::models::session::{CreateSession, Session};
use crate::models::task::{CreateTask, Task, UpdateTask};
use crate::models::user::{CreateUser, User, UserStatus};

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        Ok(User::create(&self.pool, data).await?)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn record_login(&self, id: Uuid) -> StoreResult<()> {
        User::update_last_login(&self.pool, id).await?;
        Ok(())
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> StoreResult<bool> {
        Ok(User::set_status(&self.pool, id, status).await?)
    }

    async fn set_a2f_state(
        &self,
        id: Uuid,
        secret: Option<String>,
        enabled: bool,
    ) -> StoreResult<bool> {
        Ok(User::set_a2f_state(&self.pool, id, secret.as_deref(), enabled).await?)
    }

    async fn enable_a2f(&self, id: Uuid, expected_secret: &str) -> StoreResult<bool> {
        Ok(User::enable_a2f(&self.pool, id, expected_secret).await?)
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn create_group(&self, data: CreateGroup) -> StoreResult<Group> {
        Ok(Group::create_with_owner(&self.pool, data).await?)
    }

    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
        Ok(Group::find_by_id(&self.pool, id).await?)
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Group>> {
        Ok(Group::list_for_user(&self.pool, user_id).await?)
    }

    async fn update_group(&self, id: Uuid, data: UpdateGroup) -> StoreResult<Option<Group>> {
        Ok(Group::update(&self.pool, id, data).await?)
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Group::delete(&self.pool, id).await?)
    }

    async fn add_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> StoreResult<GroupMembership> {
        Ok(GroupMembership::create(&self.pool, group_id, user_id, role).await?)
    }

    async fn update_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> StoreResult<Option<GroupMembership>> {
        match GroupMembership::update_role(&self.pool, group_id, user_id, role).await? {
            OwnerGuarded::Applied(membership) => Ok(Some(membership)),
            OwnerGuarded::Missing => Ok(None),
            OwnerGuarded::LastOwner => Err(StoreError::LastOwner(group_id)),
        }
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        match GroupMembership::delete(&self.pool, group_id, user_id).await? {
            OwnerGuarded::Applied(()) => Ok(true),
            OwnerGuarded::Missing => Ok(false),
            OwnerGuarded::LastOwner => Err(StoreError::LastOwner(group_id)),
        }
    }

    async fn list_members(&self, group_id: Uuid) -> StoreResult<Vec<GroupMembership>> {
        Ok(GroupMembership::list_by_group(&self.pool, group_id).await?)
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> StoreResult<Vec<GroupMembership>> {
        Ok(GroupMembership::list_by_user(&self.pool, user_id).await?)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, data: CreateSession) -> StoreResult<Session> {
        Ok(Session::create(&self.pool, data).await?)
    }

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(Session::find_by_token(&self.pool, token).await?)
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Session::delete(&self.pool, id).await?)
    }

    async fn delete_sessions_by_token(&self, token: &str) -> StoreResult<u64> {
        Ok(Session::delete_by_token(&self.pool, token).await?)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        Ok(Session::delete_by_user(&self.pool, user_id).await?)
    }

    async fn delete_expired_sessions(&self) -> StoreResult<u64> {
        Ok(Session::delete_expired(&self.pool).await?)
    }
}

#[async_trait]
impl WorkStore for PgStore {
    async fn create_project(&self, data: CreateProject) -> StoreResult<Project> {
        Ok(Project::create(&self.pool, data).await?)
    }

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        Ok(Project::find_by_id(&self.pool, id).await?)
    }

    async fn list_projects(&self, group_id: Uuid) -> StoreResult<Vec<Project>> {
        Ok(Project::list_by_group(&self.pool, group_id).await?)
    }

    async fn update_project(&self, id: Uuid, data: UpdateProject) -> StoreResult<Option<Project>> {
        Ok(Project::update(&self.pool, id, data).await?)
    }

    async fn delete_project(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Project::delete(&self.pool, id).await?)
    }

    async fn create_task(&self, data: CreateTask) -> StoreResult<Task> {
        Ok(Task::create(&self.pool, data).await?)
    }

    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(Task::find_by_id(&self.pool, id).await?)
    }

    async fn list_tasks(&self, project_id: Uuid) -> StoreResult<Vec<Task>> {
        Ok(Task::list_by_project(&self.pool, project_id).await?)
    }

    async fn update_task(&self, id: Uuid, data: UpdateTask) -> StoreResult<Option<Task>> {
        Ok(Task::update(&self.pool, id, data).await?)
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Task::delete(&self.pool, id).await?)
    }
}
