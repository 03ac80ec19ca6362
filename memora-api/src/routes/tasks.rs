/// Tasks inside a project
///
/// Permissions are checked against the group owning the task's project.
///
/// ```text
/// GET    /v1/projects/:project_id/tasks   group:view
/// POST   /v1/projects/:project_id/tasks   task:create
/// PATCH  /v1/tasks/:task_id               task:update
/// DELETE /v1/tasks/:task_id               task:delete
/// ```
///
/// An assignee must be a member of that group. Tasks of projects outside
/// the caller's groups are reported as not found.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use memora_shared::auth::guards::{require_capability, CurrentUser};
use memora_shared::auth::permissions::Capability;
use memora_shared::models::project::Project;
use memora_shared::models::task::{CreateTask, Task, TaskStatus, UpdateTask};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::projects::load_project;
use super::{check_text, double_option};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::SessionUser,
};

const DESCRIPTION_MAX: usize = 10_000;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    pub assignee_id: Option<Uuid>,

    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub status: Option<TaskStatus>,

    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Task>>> {
    let project = load_project(&state, &caller, project_id).await?;
    require_capability(&state.capabilities, &caller, project.group_id, Capability::ViewGroup)?;

    let tasks = state.stores.work.list_tasks(project_id).await?;
    Ok(Json(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let project = load_project(&state, &caller, project_id).await?;
    require_capability(&state.capabilities, &caller, project.group_id, Capability::CreateTask)?;
    req.validate()?;

    if let Some(assignee_id) = req.assignee_id {
        ensure_assignable(&state, project.group_id, assignee_id).await?;
    }

    let task = state
        .stores
        .work
        .create_task(CreateTask {
            project_id,
            title: req.title.trim().to_string(),
            description: req.description,
            assignee_id: req.assignee_id,
            due_date: req.due_date,
            created_by: caller.id,
        })
        .await?;

    tracing::info!(task_id = %task.id, project_id = %project_id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let task = load_task(&state, task_id).await?;
    let project = load_task_project(&state, &caller, &task).await?;
    require_capability(&state.capabilities, &caller, project.group_id, Capability::UpdateTask)?;
    req.validate()?;

    if let Some(Some(description)) = &req.description {
        check_text("description", description, DESCRIPTION_MAX)?;
    }
    if let Some(Some(assignee_id)) = req.assignee_id {
        ensure_assignable(&state, project.group_id, assignee_id).await?;
    }

    let update = UpdateTask {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        status: req.status,
        assignee_id: req.assignee_id,
        due_date: req.due_date,
    };
    let task = state
        .stores
        .work
        .update_task(task_id, update)
        .await?
        .ok_or_else(task_not_found)?;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let task = load_task(&state, task_id).await?;
    let project = load_task_project(&state, &caller, &task).await?;
    require_capability(&state.capabilities, &caller, project.group_id, Capability::DeleteTask)?;

    if !state.stores.work.delete_task(task_id).await? {
        return Err(task_not_found());
    }

    tracing::info!(task_id = %task_id, user_id = %caller.id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_task(state: &AppState, task_id: Uuid) -> ApiResult<Task> {
    state
        .stores
        .work
        .find_task(task_id)
        .await?
        .ok_or_else(task_not_found)
}

/// Project of a task, with a hidden project reported as a missing task
async fn load_task_project(state: &AppState, caller: &CurrentUser, task: &Task) -> ApiResult<Project> {
    match load_project(state, caller, task.project_id).await {
        Err(ApiError::NotFound(_)) => Err(task_not_found()),
        other => other,
    }
}

async fn ensure_assignable(state: &AppState, group_id: Uuid, assignee_id: Uuid) -> ApiResult<()> {
    let members = state.stores.groups.list_members(group_id).await?;
    if members.iter().any(|m| m.user_id == assignee_id) {
        Ok(())
    } else {
        Err(ApiError::invalid_field(
            "assignee_id",
            "Assignee is not a member of this group",
        ))
    }
}

fn task_not_found() -> ApiError {
    ApiError::NotFound("Task not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_null_vs_absent() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"assignee_id": null, "status": "in_progress"}"#).unwrap();

        assert_eq!(req.assignee_id, Some(None));
        assert_eq!(req.due_date, None);
        assert_eq!(req.status, Some(TaskStatus::InProgress));
    }

    #[test]
    fn test_update_request_sets_due_date() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"due_date": "2026-11-02"}"#).unwrap();

        assert_eq!(req.due_date, Some(NaiveDate::from_ymd_opt(2026, 11, 2)));
    }
}
