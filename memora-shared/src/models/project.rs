/// Project model and database operations
///
/// Projects belong to a group; tasks belong to a project. Authorization is
/// always evaluated against the owning group.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     group_id UUID NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Project inside a group
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,

    /// Owning group
    pub group_id: Uuid,

    pub name: String,

    pub description: Option<String>,

    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub group_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

/// Partial project update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,

    /// Use Some(None) to clear
    pub description: Option<Option<String>>,
}

impl Project {
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (group_id, name, description, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, group_id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(data.group_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, group_id, name, description, created_by, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists projects of a group, newest first
    pub async fn list_by_group(pool: &PgPool, group_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, group_id, name, description, created_by, created_at, updated_at
            FROM projects
            WHERE group_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let clear_description = matches!(data.description, Some(None));
        let description = data.description.flatten();

        sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                description = CASE WHEN $4 THEN NULL ELSE COALESCE($3, description) END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, group_id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(description)
        .bind(clear_description)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a project; its tasks cascade
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
