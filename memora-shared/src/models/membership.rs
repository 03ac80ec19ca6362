/// Group and group membership models
///
/// Groups are the unit of collaboration. A user joins a group through a
/// membership carrying a role scoped to that group, which may differ from
/// the user's global role.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE groups (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE group_memberships (
///     group_id UUID NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role TEXT NOT NULL DEFAULT 'collaborator',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (group_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::permissions::Role;

/// Group of users working together
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,

    pub name: String,

    pub description: Option<String>,

    /// User who created the group
    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

/// Partial group update; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<String>,

    /// Use Some(None) to clear
    pub description: Option<Option<String>>,
}

/// Membership of a user in a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: Uuid,

    pub user_id: Uuid,

    /// Role within the group
    pub role: Role,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    group_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl MembershipRow {
    /// Rows carrying an unknown role are dropped (no access)
    fn into_membership(self) -> Option<GroupMembership> {
        match Role::parse(&self.role) {
            Some(role) => Some(GroupMembership {
                group_id: self.group_id,
                user_id: self.user_id,
                role,
                created_at: self.created_at,
            }),
            None => {
                tracing::warn!(
                    group_id = %self.group_id,
                    user_id = %self.user_id,
                    role = %self.role,
                    "Ignoring membership with unknown role"
                );
                None
            }
        }
    }
}

impl Group {
    /// Creates a group and makes the creator its owner, atomically
    pub async fn create_with_owner(pool: &PgPool, data: CreateGroup) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (name, description, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO group_memberships (group_id, user_id, role) VALUES ($1, $2, $3)",
        )
        .bind(group.id)
        .bind(data.created_by)
        .bind(Role::Owner.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(group)
    }

    /// Finds a group by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"
            SELECT id, name, description, created_by, created_at, updated_at
            FROM groups
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists the groups a user belongs to
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"
            SELECT g.id, g.name, g.description, g.created_by, g.created_at, g.updated_at
            FROM groups g
            JOIN group_memberships m ON m.group_id = g.id
            WHERE m.user_id = $1
            ORDER BY g.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Applies a partial update
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateGroup,
    ) -> Result<Option<Self>, sqlx::Error> {
        let clear_description = matches!(data.description, Some(None));
        let description = data.description.flatten();

        sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups
            SET name = COALESCE($2, name),
                description = CASE WHEN $4 THEN NULL ELSE COALESCE($3, description) END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(description)
        .bind(clear_description)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a group; memberships, projects and tasks cascade
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Outcome of a membership change that must leave the group an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerGuarded<T> {
    Applied(T),

    /// No such membership
    Missing,

    /// The change would leave the group without an owner
    LastOwner,
}

impl GroupMembership {
    /// Adds a user to a group
    ///
    /// Fails with a unique violation if the pair already exists.
    pub async fn create(
        pool: &PgPool,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            INSERT INTO group_memberships (group_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING group_id, user_id, role, created_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;

        Ok(Self {
            group_id: row.group_id,
            user_id: row.user_id,
            role,
            created_at: row.created_at,
        })
    }

    /// Finds a single membership
    pub async fn find(
        pool: &PgPool,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT group_id, user_id, role, created_at
            FROM group_memberships
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.and_then(MembershipRow::into_membership))
    }

    /// Changes a member's role, refusing to demote the last owner
    ///
    /// The group row is locked for the transaction, so concurrent changes
    /// to the same group's memberships run one after the other.
    pub async fn update_role(
        pool: &PgPool,
        group_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OwnerGuarded<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(current) = Self::lock_role(&mut tx, group_id, user_id).await? else {
            return Ok(OwnerGuarded::Missing);
        };
        if current == Role::Owner.as_str()
            && role != Role::Owner
            && Self::other_owners(&mut tx, group_id, user_id).await? == 0
        {
            return Ok(OwnerGuarded::LastOwner);
        }

        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            UPDATE group_memberships
            SET role = $3
            WHERE group_id = $1 AND user_id = $2
            RETURNING group_id, user_id, role, created_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row
            .into_membership()
            .map_or(OwnerGuarded::Missing, OwnerGuarded::Applied))
    }

    /// Removes a member from a group, refusing to remove the last owner
    pub async fn delete(
        pool: &PgPool,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<OwnerGuarded<()>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(current) = Self::lock_role(&mut tx, group_id, user_id).await? else {
            return Ok(OwnerGuarded::Missing);
        };
        if current == Role::Owner.as_str() && Self::other_owners(&mut tx, group_id, user_id).await? == 0 {
            return Ok(OwnerGuarded::LastOwner);
        }

        sqlx::query("DELETE FROM group_memberships WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(OwnerGuarded::Applied(()))
    }

    /// Locks the group row and reads the member's stored role
    async fn lock_role(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM groups WHERE id = $1 FOR UPDATE")
            .bind(group_id)
            .fetch_optional(&mut *conn)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        sqlx::query_scalar::<_, String>(
            "SELECT role FROM group_memberships WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
    }

    async fn other_owners(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM group_memberships
            WHERE group_id = $1 AND user_id <> $2 AND role = $3
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(Role::Owner.as_str())
        .fetch_one(&mut *conn)
        .await
    }

    /// Lists members of a group
    pub async fn list_by_group(pool: &PgPool, group_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT group_id, user_id, role, created_at
            FROM group_memberships
            WHERE group_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().filter_map(MembershipRow::into_membership).collect())
    }

    /// Lists every membership of a user
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT group_id, user_id, role, created_at
            FROM group_memberships
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().filter_map(MembershipRow::into_membership).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_role_row_is_dropped() {
        let row = MembershipRow {
            group_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "superuser".to_string(),
            created_at: Utc::now(),
        };
        assert!(row.into_membership().is_none());
    }

    #[test]
    fn test_known_role_row_converts() {
        let row = MembershipRow {
            group_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "manager".to_string(),
            created_at: Utc::now(),
        };
        let membership = row.into_membership().expect("known role");
        assert_eq!(membership.role, Role::Manager);
    }
}
