/// In-memory store
///
/// Implements every store trait over plain maps behind one
/// [`tokio::sync::RwLock`]. Uniqueness and cascade rules mirror the SQL
/// schema so tests exercise the same edge cases as PostgreSQL:
///
/// - emails are unique case-insensitively
/// - a (group, user) membership pair is unique
/// - session tokens are unique
/// - deleting a group removes its memberships, projects and tasks
/// - deleting a project removes its tasks
/// - a group's last owner can be neither demoted nor removed

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{GroupStore, SessionStore, StoreError, StoreResult, UserStore, WorkStore};
use crate::auth::permissions::Role;
use crate::models::membership::{CreateGroup, Group, GroupMembership, UpdateGroup};
use crate::models::project::{CreateProject, Project, UpdateProject};
use crate::models::session::{CreateSession, Session};
use crate::models::task::{CreateTask, Task, TaskStatus, UpdateTask};
use crate::models::user::{normalize_email, CreateUser, User, UserStatus};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    memberships: HashMap<(Uuid, Uuid), GroupMembership>,
    sessions: HashMap<Uuid, Session>,
    projects: HashMap<Uuid, Project>,
    tasks: HashMap<Uuid, Task>,
}

impl State {
    /// Whether `user_id` is the only owner of the group
    fn is_last_owner(&self, group_id: Uuid, user_id: Uuid) -> bool {
        let is_owner = self
            .memberships
            .get(&(group_id, user_id))
            .is_some_and(|m| m.role == Role::Owner);

        is_owner
            && !self
                .memberships
                .values()
                .any(|m| m.group_id == group_id && m.user_id != user_id && m.role == Role::Owner)
    }
}

/// Store holding everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions (test helper)
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, data: CreateUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let email = normalize_email(&data.email);

        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: data.password_hash,
            first_name: data.first_name,
            last_name: data.last_name,
            role: data.role,
            status: UserStatus::Active,
            a2f_secret: None,
            a2f_enabled: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        state.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn record_login(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&id) {
            let now = Utc::now();
            user.last_login_at = Some(now);
            user.updated_at = now;
        }
        Ok(())
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(false);
        };

        user.status = status;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_a2f_state(
        &self,
        id: Uuid,
        secret: Option<String>,
        enabled: bool,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(false);
        };

        user.a2f_enabled = enabled && secret.is_some();
        user.a2f_secret = secret;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn enable_a2f(&self, id: Uuid, expected_secret: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&id) {
            Some(user) if user.a2f_secret.as_deref() == Some(expected_secret) => {
                user.a2f_enabled = true;
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group(&self, data: CreateGroup) -> StoreResult<Group> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&data.created_by) {
            return Err(StoreError::MissingReference("groups_created_by_fkey".to_string()));
        }

        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };
        state.memberships.insert(
            (group.id, data.created_by),
            GroupMembership {
                group_id: group.id,
                user_id: data.created_by,
                role: Role::Owner,
                created_at: now,
            },
        );
        state.groups.insert(group.id, group.clone());

        Ok(group)
    }

    async fn find_group(&self, id: Uuid) -> StoreResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| state.groups.get(&m.group_id).cloned())
            .collect();
        groups.sort_by_key(|g| g.created_at);
        Ok(groups)
    }

    async fn update_group(&self, id: Uuid, data: UpdateGroup) -> StoreResult<Option<Group>> {
        let mut state = self.state.write().await;
        let Some(group) = state.groups.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = data.name {
            group.name = name;
        }
        if let Some(description) = data.description {
            group.description = description;
        }
        group.updated_at = Utc::now();

        Ok(Some(group.clone()))
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.groups.remove(&id).is_none() {
            return Ok(false);
        }

        state.memberships.retain(|(group_id, _), _| *group_id != id);

        let project_ids: Vec<Uuid> = state
            .projects
            .values()
            .filter(|p| p.group_id == id)
            .map(|p| p.id)
            .collect();
        state.projects.retain(|_, p| p.group_id != id);
        state.tasks.retain(|_, t| !project_ids.contains(&t.project_id));

        Ok(true)
    }

    async fn add_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> StoreResult<GroupMembership> {
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&group_id) {
            return Err(StoreError::MissingReference("group_memberships_group_id_fkey".to_string()));
        }
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference("group_memberships_user_id_fkey".to_string()));
        }
        if state.memberships.contains_key(&(group_id, user_id)) {
            return Err(StoreError::Conflict("group_memberships_pkey".to_string()));
        }

        let membership = GroupMembership {
            group_id,
            user_id,
            role,
            created_at: Utc::now(),
        };
        state.memberships.insert((group_id, user_id), membership.clone());

        Ok(membership)
    }

    async fn update_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> StoreResult<Option<GroupMembership>> {
        let mut state = self.state.write().await;
        if role != Role::Owner && state.is_last_owner(group_id, user_id) {
            return Err(StoreError::LastOwner(group_id));
        }
        Ok(state.memberships.get_mut(&(group_id, user_id)).map(|m| {
            m.role = role;
            m.clone()
        }))
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.is_last_owner(group_id, user_id) {
            return Err(StoreError::LastOwner(group_id));
        }
        Ok(state.memberships.remove(&(group_id, user_id)).is_some())
    }

    async fn list_members(&self, group_id: Uuid) -> StoreResult<Vec<GroupMembership>> {
        let state = self.state.read().await;
        let mut members: Vec<GroupMembership> = state
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        Ok(members)
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> StoreResult<Vec<GroupMembership>> {
        let state = self.state.read().await;
        let mut memberships: Vec<GroupMembership> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.created_at);
        Ok(memberships)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, data: CreateSession) -> StoreResult<Session> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&data.user_id) {
            return Err(StoreError::MissingReference("sessions_user_id_fkey".to_string()));
        }
        if state.sessions.values().any(|s| s.token == data.token) {
            return Err(StoreError::Conflict("sessions_token_key".to_string()));
        }

        let session = Session {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            token: data.token,
            expires_at: data.expires_at,
            created_at: Utc::now(),
        };
        state.sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let state = self.state.read().await;
        Ok(state.sessions.values().find(|s| s.token == token).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.write().await.sessions.remove(&id).is_some())
    }

    async fn delete_sessions_by_token(&self, token: &str) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.token != token);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn create_project(&self, data: CreateProject) -> StoreResult<Project> {
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&data.group_id) {
            return Err(StoreError::MissingReference("projects_group_id_fkey".to_string()));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            group_id: data.group_id,
            name: data.name,
            description: data.description,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };
        state.projects.insert(project.id, project.clone());

        Ok(project)
    }

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self, group_id: Uuid) -> StoreResult<Vec<Project>> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| p.group_id == group_id)
            .cloned()
            .collect();
        // newest first, like the SQL listing
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn update_project(&self, id: Uuid, data: UpdateProject) -> StoreResult<Option<Project>> {
        let mut state = self.state.write().await;
        let Some(project) = state.projects.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = data.name {
            project.name = name;
        }
        if let Some(description) = data.description {
            project.description = description;
        }
        project.updated_at = Utc::now();

        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.projects.remove(&id).is_none() {
            return Ok(false);
        }
        state.tasks.retain(|_, t| t.project_id != id);
        Ok(true)
    }

    async fn create_task(&self, data: CreateTask) -> StoreResult<Task> {
        let mut state = self.state.write().await;
        if !state.projects.contains_key(&data.project_id) {
            return Err(StoreError::MissingReference("tasks_project_id_fkey".to_string()));
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: data.project_id,
            title: data.title,
            description: data.description,
            status: TaskStatus::default(),
            assignee_id: data.assignee_id,
            due_date: data.due_date,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(task.id, task.clone());

        Ok(task)
    }

    async fn find_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, project_id: Uuid) -> StoreResult<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn update_task(&self, id: Uuid, data: UpdateTask) -> StoreResult<Option<Task>> {
        let mut state = self.state.write().await;
        Ok(state.tasks.get_mut(&id).map(|task| {
            task.apply(data);
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.write().await.tasks.remove(&id).is_some())
    }
}
