/// Groups and their members
///
/// | Route                                          | Requires            |
/// |------------------------------------------------|---------------------|
/// | `GET/POST /v1/groups`                          | session             |
/// | `GET /v1/groups/:group_id`                     | `group:view`        |
/// | `PATCH /v1/groups/:group_id`                   | `group:update`      |
/// | `DELETE /v1/groups/:group_id`                  | `group:delete`      |
/// | `GET /v1/groups/:group_id/members`             | `group:view`        |
/// | `POST /v1/groups/:group_id/members`            | `member:invite`     |
/// | `PATCH /v1/groups/:group_id/members/:user_id`  | `member:change_role`|
/// | `DELETE /v1/groups/:group_id/members/:user_id` | `member:remove`, or leaving |
///
/// Role changes follow two rules on top of the capability: nobody grants a
/// role above their own or touches a member ranked above them, and a group
/// always keeps at least one owner.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use memora_shared::auth::guards::{require_capability, require_grantable, require_min_role};
use memora_shared::auth::permissions::{Capability, Role};
use memora_shared::models::membership::{CreateGroup, Group, GroupMembership, UpdateGroup};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{double_option, check_text};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::SessionUser,
};

const DESCRIPTION_MAX: usize = 2000;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

/// Omitted fields are unchanged; `"description": null` clears it
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default = "default_member_role")]
    pub role: Role,
}

fn default_member_role() -> Role {
    Role::Collaborator
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

/// Member listing entry
#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

pub async fn list_groups(
    State(state): State<AppState>,
    caller: SessionUser,
) -> ApiResult<Json<Vec<Group>>> {
    let groups = state.stores.groups.list_groups_for_user(caller.id).await?;
    Ok(Json(groups))
}

/// Creates a group owned by the caller
pub async fn create_group(
    State(state): State<AppState>,
    caller: SessionUser,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    req.validate()?;

    let group = state
        .stores
        .groups
        .create_group(CreateGroup {
            name: req.name.trim().to_string(),
            description: req.description,
            created_by: caller.id,
        })
        .await?;

    tracing::info!(group_id = %group.id, user_id = %caller.id, "Group created");
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Group>> {
    require_capability(&state.capabilities, &caller, group_id, Capability::ViewGroup)?;

    let group = state
        .stores
        .groups
        .find_group(group_id)
        .await?
        .ok_or_else(group_not_found)?;

    Ok(Json(group))
}

pub async fn update_group(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
    Json(req): Json<UpdateGroupRequest>,
) -> ApiResult<Json<Group>> {
    require_capability(&state.capabilities, &caller, group_id, Capability::UpdateGroup)?;
    req.validate()?;
    if let Some(Some(description)) = &req.description {
        check_text("description", description, DESCRIPTION_MAX)?;
    }

    let update = UpdateGroup {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description,
    };
    let group = state
        .stores
        .groups
        .update_group(group_id, update)
        .await?
        .ok_or_else(group_not_found)?;

    Ok(Json(group))
}

/// Deletes the group with its projects and tasks
pub async fn delete_group(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_capability(&state.capabilities, &caller, group_id, Capability::DeleteGroup)?;

    if !state.stores.groups.delete_group(group_id).await? {
        return Err(group_not_found());
    }

    tracing::info!(group_id = %group_id, user_id = %caller.id, "Group deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Vec<MemberResponse>>> {
    require_capability(&state.capabilities, &caller, group_id, Capability::ViewGroup)?;

    let memberships = state.stores.groups.list_members(group_id).await?;
    let mut members = Vec::with_capacity(memberships.len());

    for membership in memberships {
        // rows cascade with the user, so a miss is a concurrent deletion
        let Some(user) = state.stores.users.find_user_by_id(membership.user_id).await? else {
            continue;
        };
        members.push(MemberResponse {
            user_id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: membership.role,
            joined_at: membership.created_at,
        });
    }

    Ok(Json(members))
}

/// Adds an existing user, found by email
///
/// # Errors
///
/// - `403`: caller lacks `member:invite` or the role is above their own
/// - `404`: no user with that email
/// - `409`: already a member
pub async fn add_member(
    State(state): State<AppState>,
    caller: SessionUser,
    Path(group_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<GroupMembership>)> {
    require_capability(&state.capabilities, &caller, group_id, Capability::InviteMember)?;
    require_grantable(&caller, group_id, req.role)?;
    req.validate()?;

    let user = state
        .stores
        .users
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user with this email".to_string()))?;

    let membership = state
        .stores
        .groups
        .add_member(group_id, user.id, req.role)
        .await?;

    tracing::info!(
        group_id = %group_id,
        user_id = %user.id,
        role = %req.role,
        invited_by = %caller.id,
        "Member added"
    );
    Ok((StatusCode::CREATED, Json(membership)))
}

pub async fn change_member_role(
    State(state): State<AppState>,
    caller: SessionUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<GroupMembership>> {
    require_capability(&state.capabilities, &caller, group_id, Capability::ChangeMemberRole)?;
    require_grantable(&caller, group_id, req.role)?;

    let members = state.stores.groups.list_members(group_id).await?;
    let target = find_member(&members, user_id)?;
    require_min_role(&caller, group_id, target.role)?;

    let membership = state
        .stores
        .groups
        .update_member_role(group_id, user_id, req.role)
        .await?
        .ok_or_else(member_not_found)?;

    tracing::info!(
        group_id = %group_id,
        user_id = %user_id,
        from = %target.role,
        to = %req.role,
        changed_by = %caller.id,
        "Member role changed"
    );
    Ok(Json(membership))
}

/// Removes a member, or lets the caller leave
pub async fn remove_member(
    State(state): State<AppState>,
    caller: SessionUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    if user_id == caller.id {
        require_min_role(&caller, group_id, Role::Guest)?;
    } else {
        require_capability(&state.capabilities, &caller, group_id, Capability::RemoveMember)?;
    }

    let members = state.stores.groups.list_members(group_id).await?;
    let target = find_member(&members, user_id)?;
    require_min_role(&caller, group_id, target.role)?;

    if !state.stores.groups.remove_member(group_id, user_id).await? {
        return Err(member_not_found());
    }

    tracing::info!(
        group_id = %group_id,
        user_id = %user_id,
        removed_by = %caller.id,
        "Member removed"
    );
    Ok(StatusCode::NO_CONTENT)
}

fn find_member(members: &[GroupMembership], user_id: Uuid) -> ApiResult<&GroupMembership> {
    members
        .iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(member_not_found)
}

fn group_not_found() -> ApiError {
    ApiError::NotFound("Group not found".to_string())
}

fn member_not_found() -> ApiError {
    ApiError::NotFound("Member not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(role: Role) -> GroupMembership {
        GroupMembership {
            group_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_find_member() {
        let owner = member(Role::Owner);
        let members = vec![owner.clone(), member(Role::Guest)];

        assert_eq!(find_member(&members, owner.user_id).unwrap(), &owner);
        assert!(matches!(
            find_member(&members, Uuid::new_v4()),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_request_distinguishes_null() {
        let cleared: UpdateGroupRequest =
            serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let untouched: UpdateGroupRequest = serde_json::from_str(r#"{"name": "Ops"}"#).unwrap();
        assert_eq!(untouched.description, None);
        assert_eq!(untouched.name.as_deref(), Some("Ops"));
    }

    #[test]
    fn test_add_member_defaults_to_collaborator() {
        let req: AddMemberRequest =
            serde_json::from_str(r#"{"email": "bob@example.com"}"#).unwrap();
        assert_eq!(req.role, Role::Collaborator);
    }
}
