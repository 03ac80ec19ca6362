/// API route handlers, by resource
///
/// - `health`: health check
/// - `auth`: register, login, two-factor login step, logout, current user
/// - `two_factor`: two-factor setup for the signed-in user
/// - `groups`: groups and memberships
/// - `projects`: projects inside a group
/// - `tasks`: tasks inside a project

pub mod auth;
pub mod groups;
pub mod health;
pub mod projects;
pub mod tasks;
pub mod two_factor;

use serde::{Deserialize, Deserializer};

use crate::error::{ApiError, ApiResult};

/// Keeps an explicit `null` apart from an absent field
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`:
/// absent gives `None`, `null` gives `Some(None)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Length check for fields `validator` cannot reach (nested options)
pub(crate) fn check_text(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::invalid_field(
            field,
            format!("Must be at most {} characters", max),
        ));
    }
    Ok(())
}
