/// Role hierarchy and capability map
///
/// Roles form a strict total order used for threshold checks:
///
/// ```text
/// Guest < Collaborator < Manager < Admin < Owner
/// ```
///
/// Capabilities are fine-grained permissions. A [`CapabilityMap`] assigns
/// *grants* to roles; the effective capability set of a role is the union of
/// its own grants and the grants of every lower role, so a higher role
/// always holds a superset of what the roles below it hold.
///
/// The map is a plain value. Handlers receive it through application state
/// rather than a process-wide table, which keeps the guards testable with
/// custom maps.
///
/// # Example
///
/// ```
/// use memora_shared::auth::permissions::{Capability, CapabilityMap, Role};
///
/// let map = CapabilityMap::standard();
/// assert!(map.allows(Role::Manager, Capability::CreateProject));
/// assert!(!map.allows(Role::Manager, Capability::DeleteGroup));
/// assert!(Role::Owner > Role::Admin);
/// ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ranked role, used both globally and per group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only visitor of a group
    Guest,

    /// Works on tasks
    Collaborator,

    /// Runs projects and invites people
    Manager,

    /// Manages members and group settings
    Admin,

    /// Full control, including deleting the group
    Owner,
}

impl Role {
    /// Returns every role from lowest to highest
    pub fn all() -> [Role; 5] {
        [
            Role::Guest,
            Role::Collaborator,
            Role::Manager,
            Role::Admin,
            Role::Owner,
        ]
    }

    /// Ordinal rank of the role (Guest = 1, Owner = 5)
    pub fn rank(&self) -> u8 {
        match self {
            Role::Guest => 1,
            Role::Collaborator => 2,
            Role::Manager => 3,
            Role::Admin => 4,
            Role::Owner => 5,
        }
    }

    /// Converts role to its storage form
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Collaborator => "collaborator",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Parses a role token, case-insensitively
    ///
    /// Unknown tokens return `None`. Callers must treat `None` as granting
    /// nothing, never as a default role.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Some(Role::Guest),
            "collaborator" => Some(Role::Collaborator),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    /// Checks whether this role meets a minimum threshold
    pub fn at_least(&self, min: Role) -> bool {
        self.rank() >= min.rank()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained permission checked by route handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // Group
    ViewGroup,
    UpdateGroup,
    DeleteGroup,

    // Membership
    InviteMember,
    RemoveMember,
    ChangeMemberRole,

    // Projects
    CreateProject,
    UpdateProject,
    DeleteProject,

    // Tasks
    CreateTask,
    UpdateTask,
    DeleteTask,
}

impl Capability {
    /// Every capability
    pub fn all() -> [Capability; 12] {
        [
            Capability::ViewGroup,
            Capability::UpdateGroup,
            Capability::DeleteGroup,
            Capability::InviteMember,
            Capability::RemoveMember,
            Capability::ChangeMemberRole,
            Capability::CreateProject,
            Capability::UpdateProject,
            Capability::DeleteProject,
            Capability::CreateTask,
            Capability::UpdateTask,
            Capability::DeleteTask,
        ]
    }

    /// Returns the capability name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewGroup => "group:view",
            Capability::UpdateGroup => "group:update",
            Capability::DeleteGroup => "group:delete",
            Capability::InviteMember => "member:invite",
            Capability::RemoveMember => "member:remove",
            Capability::ChangeMemberRole => "member:change_role",
            Capability::CreateProject => "project:create",
            Capability::UpdateProject => "project:update",
            Capability::DeleteProject => "project:delete",
            Capability::CreateTask => "task:create",
            Capability::UpdateTask => "task:update",
            Capability::DeleteTask => "task:delete",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective capability sets per role
///
/// Built with [`CapabilityMapBuilder`]; the builder folds grants upward
/// through the hierarchy so the per-level superset property cannot be
/// broken by a misconfigured table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityMap {
    effective: BTreeMap<Role, BTreeSet<Capability>>,
    empty: BTreeSet<Capability>,
}

impl CapabilityMap {
    /// Starts an empty map
    pub fn builder() -> CapabilityMapBuilder {
        CapabilityMapBuilder::default()
    }

    /// The table used by Memora Hub
    ///
    /// | Role         | Added capabilities                                   |
    /// |--------------|------------------------------------------------------|
    /// | Guest        | view group                                           |
    /// | Collaborator | create task, update task                             |
    /// | Manager      | delete task, create/update project, invite member    |
    /// | Admin        | delete project, remove member, change role, update group |
    /// | Owner        | delete group                                         |
    pub fn standard() -> Self {
        Self::builder()
            .grant(Role::Guest, [Capability::ViewGroup])
            .grant(
                Role::Collaborator,
                [Capability::CreateTask, Capability::UpdateTask],
            )
            .grant(
                Role::Manager,
                [
                    Capability::DeleteTask,
                    Capability::CreateProject,
                    Capability::UpdateProject,
                    Capability::InviteMember,
                ],
            )
            .grant(
                Role::Admin,
                [
                    Capability::DeleteProject,
                    Capability::RemoveMember,
                    Capability::ChangeMemberRole,
                    Capability::UpdateGroup,
                ],
            )
            .grant(Role::Owner, [Capability::DeleteGroup])
            .build()
    }

    /// Effective capabilities of a role
    ///
    /// A role with no entry in the table holds nothing.
    pub fn capabilities(&self, role: Role) -> &BTreeSet<Capability> {
        self.effective.get(&role).unwrap_or(&self.empty)
    }

    /// Checks whether a role holds a capability
    pub fn allows(&self, role: Role, capability: Capability) -> bool {
        self.capabilities(role).contains(&capability)
    }

    /// Lowest role that holds a capability, if any does
    pub fn min_role_for(&self, capability: Capability) -> Option<Role> {
        Role::all()
            .into_iter()
            .find(|role| self.allows(*role, capability))
    }
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builder for [`CapabilityMap`]
#[derive(Debug, Clone, Default)]
pub struct CapabilityMapBuilder {
    grants: BTreeMap<Role, BTreeSet<Capability>>,
}

impl CapabilityMapBuilder {
    /// Adds capabilities granted at `role` (and inherited by higher roles)
    pub fn grant<I>(mut self, role: Role, capabilities: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        self.grants.entry(role).or_default().extend(capabilities);
        self
    }

    /// Folds grants up the hierarchy
    pub fn build(self) -> CapabilityMap {
        let mut effective = BTreeMap::new();
        let mut inherited = BTreeSet::new();

        for role in Role::all() {
            if let Some(own) = self.grants.get(&role) {
                inherited.extend(own.iter().copied());
            }
            effective.insert(role, inherited.clone());
        }

        CapabilityMap {
            effective,
            empty: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order_is_total() {
        let roles = Role::all();
        for (i, low) in roles.iter().enumerate() {
            for high in &roles[i + 1..] {
                assert!(low < high, "{} should rank below {}", low, high);
                assert!(low.rank() < high.rank());
                assert!(high.at_least(*low));
                assert!(!low.at_least(*high));
            }
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("manager"), Some(Role::Manager));
        assert_eq!(Role::parse(" Owner "), Some(Role::Owner));
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(""), None);

        for role in Role::all() {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Collaborator).unwrap();
        assert_eq!(json, "\"collaborator\"");

        let parsed: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(parsed, Role::Admin);
    }

    #[test]
    fn test_standard_map_is_monotonic() {
        let map = CapabilityMap::standard();
        let roles = Role::all();

        for pair in roles.windows(2) {
            let lower = map.capabilities(pair[0]);
            let higher = map.capabilities(pair[1]);
            assert!(
                lower.is_subset(higher),
                "{} must hold everything {} holds",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_standard_map_grants() {
        let map = CapabilityMap::standard();

        assert!(map.allows(Role::Guest, Capability::ViewGroup));
        assert!(!map.allows(Role::Guest, Capability::CreateTask));

        assert!(map.allows(Role::Collaborator, Capability::UpdateTask));
        assert!(!map.allows(Role::Collaborator, Capability::DeleteTask));

        assert!(map.allows(Role::Manager, Capability::CreateProject));
        assert!(!map.allows(Role::Manager, Capability::DeleteGroup));

        assert!(map.allows(Role::Admin, Capability::ChangeMemberRole));
        assert!(!map.allows(Role::Admin, Capability::DeleteGroup));

        assert!(map.allows(Role::Owner, Capability::DeleteGroup));
        assert_eq!(map.capabilities(Role::Owner).len(), 12);
    }

    #[test]
    fn test_builder_folds_grants_upward() {
        // Owner is only granted at Guest level, yet inherits it
        let map = CapabilityMap::builder()
            .grant(Role::Guest, [Capability::ViewGroup])
            .grant(Role::Admin, [Capability::DeleteGroup])
            .build();

        assert!(map.allows(Role::Owner, Capability::ViewGroup));
        assert!(map.allows(Role::Owner, Capability::DeleteGroup));
        assert!(!map.allows(Role::Manager, Capability::DeleteGroup));
    }

    #[test]
    fn test_empty_map_grants_nothing() {
        let map = CapabilityMap::builder().build();
        for role in Role::all() {
            assert!(map.capabilities(role).is_empty());
        }
    }

    #[test]
    fn test_min_role_for() {
        let map = CapabilityMap::standard();
        assert_eq!(map.min_role_for(Capability::ViewGroup), Some(Role::Guest));
        assert_eq!(map.min_role_for(Capability::CreateProject), Some(Role::Manager));
        assert_eq!(map.min_role_for(Capability::DeleteGroup), Some(Role::Owner));

        let empty = CapabilityMap::builder().build();
        assert_eq!(empty.min_role_for(Capability::ViewGroup), None);
    }
}
