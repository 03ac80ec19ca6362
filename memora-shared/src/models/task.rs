/// Task model and database operations
///
/// Tasks are work items inside a project.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('todo', 'in_progress', 'done');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     status task_status NOT NULL DEFAULT 'todo',
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     due_date DATE,
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Task progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Todo,

    /// Someone is working on it
    InProgress,

    /// Finished
    Done,
}

impl TaskStatus {
    /// Converts status to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

/// Task inside a project
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,

    /// Owning project
    pub project_id: Uuid,

    pub title: String,

    pub description: Option<String>,

    pub status: TaskStatus,

    /// Member responsible for the task
    pub assignee_id: Option<Uuid>,

    pub due_date: Option<NaiveDate>,

    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub created_by: Uuid,
}

/// Partial task update
///
/// Nested options distinguish "leave unchanged" (None) from "clear"
/// (Some(None)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<NaiveDate>>,
}

const TASK_COLUMNS: &str = "id, project_id, title, description, status, assignee_id, due_date, \
                            created_by, created_at, updated_at";

impl Task {
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO tasks (project_id, title, description, assignee_id, due_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TASK_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(data.project_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.assignee_id)
            .bind(data.due_date)
            .bind(data.created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lists tasks of a project in creation order
    pub async fn list_by_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = $1 ORDER BY created_at ASC"
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Applies a partial update
    ///
    /// Reads the current row, merges the change and writes it back, so the
    /// SQL stays free of per-column clear flags.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(mut task) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        task.apply(data);

        let query = format!(
            r#"
            UPDATE tasks
            SET title = $2, description = $3, status = $4, assignee_id = $5,
                due_date = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(task.title)
            .bind(task.description)
            .bind(task.status)
            .bind(task.assignee_id)
            .bind(task.due_date)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Merges a partial update into this record (no timestamp change)
    pub fn apply(&mut self, data: UpdateTask) {
        if let Some(title) = data.title {
            self.title = title;
        }
        if let Some(description) = data.description {
            self.description = description;
        }
        if let Some(status) = data.status {
            self.status = status;
        }
        if let Some(assignee_id) = data.assignee_id {
            self.assignee_id = assignee_id;
        }
        if let Some(due_date) = data.due_date {
            self.due_date = due_date;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "Write minutes".to_string(),
            description: Some("Weekly sync".to_string()),
            status: TaskStatus::Todo,
            assignee_id: Some(Uuid::new_v4()),
            due_date: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_task_status_as_str() {
        assert_eq!(TaskStatus::Todo.as_str(), "todo");
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskStatus::Done.as_str(), "done");
        assert_eq!(TaskStatus::default(), TaskStatus::Todo);
    }

    #[test]
    fn test_task_status_serde() {
        let status: TaskStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, TaskStatus::InProgress);
    }

    #[test]
    fn test_apply_partial_update() {
        let mut task = sample_task();

        task.apply(UpdateTask {
            status: Some(TaskStatus::Done),
            assignee_id: Some(None),
            ..Default::default()
        });

        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.assignee_id, None);
        assert_eq!(task.title, "Write minutes");
        assert_eq!(task.description.as_deref(), Some("Weekly sync"));
    }
}
