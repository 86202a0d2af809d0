use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Administrator", alias = "administrator")]
    Administrator,
    #[serde(rename = "HR Manager", alias = "hr_manager")]
    HrManager,
    #[serde(rename = "Manager", alias = "manager")]
    Manager,
    #[serde(rename = "Employee", alias = "employee")]
    Employee,
}

impl Role {
    pub const ALL: [Role; 4] = [Self::Administrator, Self::HrManager, Self::Manager, Self::Employee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::HrManager => "hr_manager",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::HrManager => "HR Manager",
            Self::Manager => "Manager",
            Self::Employee => "Employee",
        }
    }

    /// Accepts both the storage encoding and the display label.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "administrator" | "admin" => Some(Self::Administrator),
            "hr_manager" | "hr" => Some(Self::HrManager),
            "manager" => Some(Self::Manager),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Capability tags held by a user. Authorization checks ask whether this set
/// intersects the set an operation requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn intersects(&self, required: &[Role]) -> bool {
        required.iter().any(|role| self.0.contains(role))
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub roles: RoleSet,
    pub reporting_manager_id: Option<UserId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The caller of a workflow operation, resolved per request from its bearer
/// token and handed explicitly to every service call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
    pub roles: RoleSet,
}

impl Actor {
    pub fn has_any_role(&self, required: &[Role]) -> bool {
        self.roles.intersects(required)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self { id: user.id.clone(), display_name: user.display_name.clone(), roles: user.roles.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, RoleSet};

    #[test]
    fn role_parse_accepts_labels_and_storage_keys() {
        assert_eq!(Role::parse("HR Manager"), Some(Role::HrManager));
        assert_eq!(Role::parse("hr_manager"), Some(Role::HrManager));
        assert_eq!(Role::parse(" Administrator "), Some(Role::Administrator));
        assert_eq!(Role::parse("owner"), None);

        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_set_intersection_drives_authorization() {
        let roles = RoleSet::new([Role::Manager, Role::Employee]);

        assert!(roles.intersects(&[Role::Administrator, Role::Manager]));
        assert!(!roles.intersects(&[Role::Administrator, Role::HrManager]));
        assert!(!roles.intersects(&[]));
    }

    #[test]
    fn role_set_serializes_as_display_labels() {
        let roles = RoleSet::new([Role::HrManager, Role::Employee]);
        let json = serde_json::to_string(&roles).expect("serialize");

        assert_eq!(json, r#"["HR Manager","Employee"]"#);
    }
}
