/// HTTP tests for group-scoped permissions

mod common;

use axum::http::StatusCode;
use common::TestApp;
use memora_shared::auth::permissions::{Capability, CapabilityMap, Role};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_creator_owns_group() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    let groups = app.get("/v1/groups", &alice.cookie).await;
    assert_eq!(groups.status, StatusCode::OK);
    assert_eq!(groups.body[0]["id"], group_id.as_str());

    let me = app.get("/v1/auth/me", &alice.cookie).await;
    assert_eq!(me.body["memberships"][0]["group_id"], group_id.as_str());
    assert_eq!(me.body["memberships"][0]["role"], "owner");

    let members = app
        .get(&format!("/v1/groups/{}/members", group_id), &alice.cookie)
        .await;
    assert_eq!(members.status, StatusCode::OK);
    assert_eq!(members.body[0]["email"], "alice@example.com");
    assert_eq!(members.body[0]["role"], "owner");
}

#[tokio::test]
async fn test_non_member_is_forbidden() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let mallory = app.register("mallory@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    let response = app
        .get(&format!("/v1/groups/{}", group_id), &mallory.cookie)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "forbidden");

    let response = app
        .get(&format!("/v1/groups/{}/projects", group_id), &mallory.cookie)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let groups = app.get("/v1/groups", &mallory.cookie).await;
    assert_eq!(groups.body, json!([]));
}

#[tokio::test]
async fn test_foreign_project_looks_missing() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let mallory = app.register("mallory@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    let project = app
        .post(
            &format!("/v1/groups/{}/projects", group_id),
            &alice.cookie,
            json!({ "name": "Survey" }),
        )
        .await;
    let project_id = project.body["id"].as_str().unwrap().to_string();
    let task = app
        .post(
            &format!("/v1/projects/{}/tasks", project_id),
            &alice.cookie,
            json!({ "title": "Review" }),
        )
        .await;
    let task_id = task.body["id"].as_str().unwrap().to_string();
    let unknown = Uuid::new_v4();

    let existing = app
        .get(&format!("/v1/projects/{}/tasks", project_id), &mallory.cookie)
        .await;
    let missing = app
        .get(&format!("/v1/projects/{}/tasks", unknown), &mallory.cookie)
        .await;
    assert_eq!(existing.status, StatusCode::NOT_FOUND);
    assert_eq!(existing.body, missing.body);

    let existing = app
        .patch(&format!("/v1/projects/{}", project_id), &mallory.cookie, json!({ "name": "Mine" }))
        .await;
    assert_eq!(existing.status, StatusCode::NOT_FOUND);

    let existing = app.delete(&format!("/v1/tasks/{}", task_id), &mallory.cookie).await;
    let missing = app.delete(&format!("/v1/tasks/{}", unknown), &mallory.cookie).await;
    assert_eq!(existing.status, StatusCode::NOT_FOUND);
    assert_eq!(existing.body, missing.body);

    // still there for its group
    let tasks = app
        .get(&format!("/v1/projects/{}/tasks", project_id), &alice.cookie)
        .await;
    assert_eq!(tasks.body[0]["id"], task_id.as_str());
}

#[tokio::test]
async fn test_collaborator_capabilities() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;
    app.add_member(&alice, &group_id, &bob, "collaborator").await;

    // bob cannot start projects
    let denied = app
        .post(
            &format!("/v1/groups/{}/projects", group_id),
            &bob.cookie,
            json!({ "name": "Side quest" }),
        )
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let project = app
        .post(
            &format!("/v1/groups/{}/projects", group_id),
            &alice.cookie,
            json!({ "name": "Survey", "description": "Field survey" }),
        )
        .await;
    assert_eq!(project.status, StatusCode::CREATED);
    let project_id = project.body["id"].as_str().unwrap().to_string();

    // but can create and update tasks
    let task = app
        .post(
            &format!("/v1/projects/{}/tasks", project_id),
            &bob.cookie,
            json!({ "title": "Collect samples", "assignee_id": bob.id }),
        )
        .await;
    assert_eq!(task.status, StatusCode::CREATED);
    assert_eq!(task.body["status"], "todo");
    let task_id = task.body["id"].as_str().unwrap().to_string();

    let updated = app
        .patch(
            &format!("/v1/tasks/{}", task_id),
            &bob.cookie,
            json!({ "status": "in_progress", "assignee_id": null }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["status"], "in_progress");
    assert!(updated.body["assignee_id"].is_null());
    assert_eq!(updated.body["title"], "Collect samples");

    let tasks = app
        .get(&format!("/v1/projects/{}/tasks", project_id), &bob.cookie)
        .await;
    assert_eq!(tasks.body.as_array().unwrap().len(), 1);

    // deleting needs a manager
    let delete = app.delete(&format!("/v1/tasks/{}", task_id), &bob.cookie).await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let delete = app.delete(&format!("/v1/tasks/{}", task_id), &alice.cookie).await;
    assert_eq!(delete.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_assignee_must_be_member() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let outsider = app.register("outsider@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    let project = app
        .post(
            &format!("/v1/groups/{}/projects", group_id),
            &alice.cookie,
            json!({ "name": "Survey" }),
        )
        .await;
    let project_id = project.body["id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/v1/projects/{}/tasks", project_id),
            &alice.cookie,
            json!({ "title": "Review", "assignee_id": outsider.id }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["details"][0]["field"], "assignee_id");
}

#[tokio::test]
async fn test_cannot_grant_above_own_role() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let carol = app.register("carol@example.com").await;
    let dave = app.register("dave@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;
    app.add_member(&alice, &group_id, &carol, "admin").await;

    let response = app
        .post(
            &format!("/v1/groups/{}/members", group_id),
            &carol.cookie,
            json!({ "email": dave.email, "role": "owner" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    app.add_member(&carol, &group_id, &dave, "manager").await;

    // admins cannot demote the owner
    let response = app
        .patch(
            &format!("/v1/groups/{}/members/{}", group_id, alice.id),
            &carol.cookie,
            json!({ "role": "guest" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .patch(
            &format!("/v1/groups/{}/members/{}", group_id, dave.id),
            &carol.cookie,
            json!({ "role": "collaborator" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["role"], "collaborator");

    let duplicate = app
        .post(
            &format!("/v1/groups/{}/members", group_id),
            &carol.cookie,
            json!({ "email": dave.email, "role": "guest" }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_invitee() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    let response = app
        .post(
            &format!("/v1/groups/{}/members", group_id),
            &alice.cookie,
            json!({ "email": "ghost@example.com" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_group_keeps_an_owner() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    let leave = app
        .delete(&format!("/v1/groups/{}/members/{}", group_id, alice.id), &alice.cookie)
        .await;
    assert_eq!(leave.status, StatusCode::CONFLICT);
    assert_eq!(leave.body["message"], "A group needs at least one owner");

    let demote = app
        .patch(
            &format!("/v1/groups/{}/members/{}", group_id, alice.id),
            &alice.cookie,
            json!({ "role": "admin" }),
        )
        .await;
    assert_eq!(demote.status, StatusCode::CONFLICT);

    // with a second owner, alice may step down
    app.add_member(&alice, &group_id, &bob, "owner").await;
    let demote = app
        .patch(
            &format!("/v1/groups/{}/members/{}", group_id, alice.id),
            &alice.cookie,
            json!({ "role": "admin" }),
        )
        .await;
    assert_eq!(demote.status, StatusCode::OK);
}

#[tokio::test]
async fn test_member_can_leave() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;
    app.add_member(&alice, &group_id, &bob, "guest").await;

    // a guest cannot remove others
    let response = app
        .delete(&format!("/v1/groups/{}/members/{}", group_id, alice.id), &bob.cookie)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .delete(&format!("/v1/groups/{}/members/{}", group_id, bob.id), &bob.cookie)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = app.get(&format!("/v1/groups/{}", group_id), &bob.cookie).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_group_update_and_delete() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let carol = app.register("carol@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;
    app.add_member(&alice, &group_id, &carol, "admin").await;

    let updated = app
        .patch(
            &format!("/v1/groups/{}", group_id),
            &carol.cookie,
            json!({ "name": "Research & Development", "description": "R&D" }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], "Research & Development");
    assert_eq!(updated.body["description"], "R&D");

    let cleared = app
        .patch(
            &format!("/v1/groups/{}", group_id),
            &carol.cookie,
            json!({ "description": null }),
        )
        .await;
    assert!(cleared.body["description"].is_null());
    assert_eq!(cleared.body["name"], "Research & Development");

    // only the owner deletes
    let response = app.delete(&format!("/v1/groups/{}", group_id), &carol.cookie).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.delete(&format!("/v1/groups/{}", group_id), &alice.cookie).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = app.get(&format!("/v1/groups/{}", group_id), &alice.cookie).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_project_update_needs_manager() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;
    app.add_member(&alice, &group_id, &bob, "manager").await;

    let project = app
        .post(
            &format!("/v1/groups/{}/projects", group_id),
            &bob.cookie,
            json!({ "name": "Survey" }),
        )
        .await;
    assert_eq!(project.status, StatusCode::CREATED);
    let project_id = project.body["id"].as_str().unwrap().to_string();

    let renamed = app
        .patch(
            &format!("/v1/projects/{}", project_id),
            &bob.cookie,
            json!({ "name": "Coastal survey" }),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["name"], "Coastal survey");

    // deleting a project is an admin capability
    let response = app.delete(&format!("/v1/projects/{}", project_id), &bob.cookie).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.delete(&format!("/v1/projects/{}", project_id), &alice.cookie).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = app
        .get(&format!("/v1/projects/{}/tasks", project_id), &alice.cookie)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_capability_table_is_injected() {
    let map = CapabilityMap::builder()
        .grant(Role::Guest, [Capability::ViewGroup])
        .build();
    let app = TestApp::with_capabilities(map);
    let alice = app.register("alice@example.com").await;
    let group_id = app.create_group(&alice, "Research").await;

    // even the owner holds only what the table grants
    let response = app.get(&format!("/v1/groups/{}", group_id), &alice.cookie).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .post(
            &format!("/v1/groups/{}/projects", group_id),
            &alice.cookie,
            json!({ "name": "Survey" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}
