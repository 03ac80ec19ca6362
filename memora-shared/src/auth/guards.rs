/// Group-scoped permission guards
///
/// A request's [`CurrentUser`] carries the memberships loaded at
/// authentication time, so every guard here is a synchronous, pure function
/// of that value and a [`CapabilityMap`]. Nothing touches storage or shared
/// state.
///
/// Not being a member of a group is different from being a Guest in it:
/// [`resolve_role`] returns `None`, and every guard then denies, including a
/// Guest threshold.
///
/// The `can_*`/`has_*` forms answer yes or no. The `require_*` forms return
/// an [`AuthzError`] that handlers turn into a 403.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use memora_shared::auth::guards::{can_do, has_min_role, CurrentUser};
/// use memora_shared::auth::permissions::{Capability, CapabilityMap, Role};
/// use memora_shared::models::membership::GroupMembership;
/// use uuid::Uuid;
///
/// let group_id = Uuid::new_v4();
/// let user_id = Uuid::new_v4();
/// let user = CurrentUser {
///     id: user_id,
///     email: "alice@example.com".to_string(),
///     role: Role::Collaborator,
///     memberships: vec![GroupMembership {
///         group_id,
///         user_id,
///         role: Role::Manager,
///         created_at: Utc::now(),
///     }],
/// };
///
/// let map = CapabilityMap::standard();
/// assert!(can_do(&map, &user, group_id, Capability::CreateProject));
/// assert!(!can_do(&map, &user, group_id, Capability::DeleteGroup));
/// assert!(!has_min_role(&user, Uuid::new_v4(), Role::Guest));
/// ```

use serde::Serialize;
use uuid::Uuid;

use super::permissions::{Capability, CapabilityMap, Role};
use crate::models::membership::GroupMembership;
use crate::models::user::User;

/// Authenticated user with their group memberships
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,

    pub email: String,

    /// Global role; never consulted for group checks
    pub role: Role,

    pub memberships: Vec<GroupMembership>,
}

impl CurrentUser {
    pub fn new(user: &User, memberships: Vec<GroupMembership>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            memberships,
        }
    }
}

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// No membership in the group
    #[error("Not a member of group {0}")]
    NotMember(Uuid),

    /// Role lacks the capability
    #[error("Role {role} lacks capability {capability}")]
    MissingCapability { capability: Capability, role: Role },

    /// Role below the required threshold
    #[error("Insufficient role: requires {required}, has {actual}")]
    InsufficientRole { required: Role, actual: Role },
}

/// Role the user holds in a group, if any
pub fn resolve_role(user: &CurrentUser, group_id: Uuid) -> Option<Role> {
    user.memberships
        .iter()
        .find(|m| m.group_id == group_id)
        .map(|m| m.role)
}

/// Whether the user may exercise `capability` in the group
pub fn can_do(map: &CapabilityMap, user: &CurrentUser, group_id: Uuid, capability: Capability) -> bool {
    resolve_role(user, group_id).is_some_and(|role| map.allows(role, capability))
}

/// Whether the user's role in the group is at least `min`
pub fn has_min_role(user: &CurrentUser, group_id: Uuid, min: Role) -> bool {
    resolve_role(user, group_id).is_some_and(|role| role >= min)
}

/// Requires a capability in the group
///
/// # Errors
///
/// [`AuthzError::NotMember`] without membership,
/// [`AuthzError::MissingCapability`] when the role lacks it.
pub fn require_capability(
    map: &CapabilityMap,
    user: &CurrentUser,
    group_id: Uuid,
    capability: Capability,
) -> Result<Role, AuthzError> {
    let role = resolve_role(user, group_id).ok_or(AuthzError::NotMember(group_id))?;

    if !map.allows(role, capability) {
        tracing::debug!(
            user_id = %user.id,
            group_id = %group_id,
            role = %role,
            capability = %capability,
            "Capability denied"
        );
        return Err(AuthzError::MissingCapability { capability, role });
    }

    Ok(role)
}

/// Requires a minimum role in the group
pub fn require_min_role(user: &CurrentUser, group_id: Uuid, min: Role) -> Result<Role, AuthzError> {
    let role = resolve_role(user, group_id).ok_or(AuthzError::NotMember(group_id))?;

    if role < min {
        return Err(AuthzError::InsufficientRole {
            required: min,
            actual: role,
        });
    }

    Ok(role)
}

/// Requires that the user may hand out `granted` in the group
///
/// Nobody can grant a role above their own.
pub fn require_grantable(user: &CurrentUser, group_id: Uuid, granted: Role) -> Result<Role, AuthzError> {
    require_min_role(user, group_id, granted)
}
