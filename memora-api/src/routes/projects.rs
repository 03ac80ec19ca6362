/// Projects inside a group
///
/// ```text
/// GET    /v1/groups/:group_id/projects   group:view
/// POST   /v1/groups/:group_id/projects   project:create
/// PATCH  /v1/projects/:project_id        project:update
/// DELETE /v1/projects/:project_id        project:delete
/// ```
///
/// A project in a group the caller does not belong to is reported as not
/// found, the same as a missing one.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use memora_shared::auth::guards::{require_capability, resolve_role, CurrentUser};
use memora_shared::auth::permissions::Capability;
use memora_shared::models::project::{CreateProject, Project, UpdateProject};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{check_text, double_option};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::SessionUser,
};

const DESCRIPTION_MAX: usize = 5000;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Project>>> {
    require_capability(&state.capabilities, &caller, group_id, Capability::ViewGroup)?;

    let projects = state.stores.work.list_projects(group_id).await?;
    Ok(Json(projects))
}

pub async fn create_project(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    require_capability(&state.capabilities, &caller, group_id, Capability::CreateProject)?;
    req.validate()?;

    let project = state
        .stores
        .work
        .create_project(CreateProject {
            group_id,
            name: req.name.trim().to_string(),
            description: req.description,
            created_by: caller.id,
        })
        .await?;

    tracing::info!(project_id = %project.id, group_id = %group_id, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let project = load_project(&state, &caller, project_id).await?;
    require_capability(&state.capabilities, &caller, project.group_id, Capability::UpdateProject)?;
    req.validate()?;
    if let Some(Some(description)) = &req.description {
        check_text("description", description, DESCRIPTION_MAX)?;
    }

    let update = UpdateProject {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description,
    };
    let project = state
        .stores
        .work
        .update_project(project_id, update)
        .await?
        .ok_or_else(project_not_found)?;

    Ok(Json(project))
}

/// Deletes the project and its tasks
pub async fn delete_project(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let project = load_project(&state, &caller, project_id).await?;
    require_capability(&state.capabilities, &caller, project.group_id, Capability::DeleteProject)?;

    if !state.stores.work.delete_project(project_id).await? {
        return Err(project_not_found());
    }

    tracing::info!(project_id = %project_id, user_id = %caller.id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Loads a project for a permission check on its group
///
/// Not found unless the caller is a member of that group.
pub(crate) async fn load_project(
    state: &AppState,
    caller: &CurrentUser,
    project_id: Uuid,
) -> ApiResult<Project> {
    let project = state
        .stores
        .work
        .find_project(project_id)
        .await?
        .ok_or_else(project_not_found)?;

    if resolve_role(caller, project.group_id).is_none() {
        tracing::debug!(project_id = %project_id, user_id = %caller.id, "Project outside caller's groups");
        return Err(project_not_found());
    }
    Ok(project)
}

fn project_not_found() -> ApiError {
    ApiError::NotFound("Project not found".to_string())
}
