//! Capabilities a user may hold.
//!
//! Role names must match the seed data in `20261001000001_create_identity_tables.sql`.
//! Capabilities form a closed set: every check goes through [`Capability`] so an
//! unknown role string can never satisfy an authorization guard.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_APPROVER: &str = "approver";
pub const ROLE_REQUESTER: &str = "requester";

/// A single grantable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Admin,
    Approver,
    Requester,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Admin, Capability::Approver, Capability::Requester];

    /// The role name stored in the `roles` table.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Admin => ROLE_ADMIN,
            Capability::Approver => ROLE_APPROVER,
            Capability::Requester => ROLE_REQUESTER,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_ADMIN => Ok(Capability::Admin),
            ROLE_APPROVER => Ok(Capability::Approver),
            ROLE_REQUESTER => Ok(Capability::Requester),
            other => Err(CoreError::Validation(format!(
                "Invalid role '{other}'. Must be one of: {ROLE_ADMIN}, {ROLE_APPROVER}, {ROLE_REQUESTER}"
            ))),
        }
    }
}

/// The set of capabilities held by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Returns `true` if the capability was newly added.
    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    /// Returns `true` if the capability was present.
    pub fn remove(&mut self, capability: Capability) -> bool {
        self.0.remove(&capability)
    }

    pub fn is_admin(&self) -> bool {
        self.contains(Capability::Admin)
    }

    /// Approvers and admins may be selected as approvers on a change request.
    pub fn can_approve(&self) -> bool {
        self.contains(Capability::Approver) || self.contains(Capability::Admin)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let err = "superuser".parse::<Capability>().unwrap_err();
        assert!(err.to_string().contains("Invalid role"));
    }

    #[test]
    fn test_role_names_are_case_sensitive() {
        assert!("Admin".parse::<Capability>().is_err());
    }

    #[test]
    fn test_admin_can_approve() {
        let set: CapabilitySet = [Capability::Admin].into_iter().collect();
        assert!(set.can_approve());
        assert!(set.is_admin());
    }

    #[test]
    fn test_requester_cannot_approve() {
        let set: CapabilitySet = [Capability::Requester].into_iter().collect();
        assert!(!set.can_approve());
        assert!(!set.is_admin());
    }

    #[test]
    fn test_insert_and_remove_report_changes() {
        let mut set = CapabilitySet::new();
        assert!(set.insert(Capability::Approver));
        assert!(!set.insert(Capability::Approver));
        assert!(set.remove(Capability::Approver));
        assert!(!set.remove(Capability::Approver));
        assert!(set.is_empty());
    }

    #[test]
    fn test_serializes_as_lowercase_list() {
        let set: CapabilitySet = [Capability::Requester, Capability::Admin].into_iter().collect();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!(["admin", "requester"]));
    }
}
