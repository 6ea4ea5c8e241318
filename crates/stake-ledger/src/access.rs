//! Role-based access control
//!
//! ## Roles
//!
//! | Role | Grants | Gated operations |
//! |------|--------|------------------|
//! | Administrator | root only | limits, caps, system pause, role grants |
//! | Operator | administrator | tier rate/activation, position pause |
//! | EmergencyResponder | administrator | emergency withdrawal |
//!
//! The root identity is the bootstrap authority fixed at construction; it
//! holds the administrator role initially but keeps its grant authority over
//! administrators even if that role is later revoked from it.

use crate::error::{LedgerError, Result};
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Capability roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Operator,
    EmergencyResponder,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Administrator, Role::Operator, Role::EmergencyResponder];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Operator => "operator",
            Self::EmergencyResponder => "emergency_responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "operator" => Ok(Self::Operator),
            "emergency_responder" | "emergency" => Ok(Self::EmergencyResponder),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Role membership table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessControl {
    root: AccountId,
    members: HashMap<Role, BTreeSet<AccountId>>,
}

impl AccessControl {
    /// Create with `root` as bootstrap authority and initial administrator
    pub fn new(root: AccountId) -> Self {
        let mut members: HashMap<Role, BTreeSet<AccountId>> = HashMap::new();
        members.entry(Role::Administrator).or_default().insert(root);
        Self { root, members }
    }

    pub fn has_role(&self, identity: &AccountId, role: Role) -> bool {
        self.members
            .get(&role)
            .is_some_and(|set| set.contains(identity))
    }

    pub fn require_role(&self, identity: &AccountId, role: Role) -> Result<()> {
        if self.has_role(identity, role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { role: role.name() })
        }
    }

    /// Authority needed to change membership of `role`
    fn require_grant_authority(&self, caller: &AccountId, role: Role) -> Result<()> {
        match role {
            Role::Administrator if *caller == self.root => Ok(()),
            Role::Administrator => Err(LedgerError::Unauthorized { role: "root" }),
            Role::Operator | Role::EmergencyResponder => {
                self.require_role(caller, Role::Administrator)
            }
        }
    }

    /// Grant `role` to `identity`; returns false if it was already held
    pub fn grant_role(&mut self, caller: &AccountId, identity: AccountId, role: Role) -> Result<bool> {
        self.require_grant_authority(caller, role)?;
        Ok(self.members.entry(role).or_default().insert(identity))
    }

    /// Revoke `role` from `identity`; returns false if it was not held
    pub fn revoke_role(&mut self, caller: &AccountId, identity: &AccountId, role: Role) -> Result<bool> {
        self.require_grant_authority(caller, role)?;
        Ok(self
            .members
            .get_mut(&role)
            .is_some_and(|set| set.remove(identity)))
    }

    /// Members of a role, in stable order
    pub fn members(&self, role: Role) -> Vec<AccountId> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Roles held by an identity
    pub fn roles_of(&self, identity: &AccountId) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.has_role(identity, *role))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AccessControl, AccountId, AccountId, AccountId) {
        let root = AccountId::from_name("owner");
        let operator = AccountId::from_name("operator");
        let user = AccountId::from_name("user1");
        let mut acl = AccessControl::new(root);
        acl.grant_role(&root, operator, Role::Operator).unwrap();
        (acl, root, operator, user)
    }

    #[test]
    fn test_root_is_administrator() {
        let (acl, root, _, _) = setup();
        assert!(acl.has_role(&root, Role::Administrator));
        assert_eq!(acl.roles_of(&root), vec![Role::Administrator]);
    }

    #[test]
    fn test_require_role() {
        let (acl, _, operator, user) = setup();
        assert!(acl.require_role(&operator, Role::Operator).is_ok());
        assert!(matches!(
            acl.require_role(&user, Role::Operator),
            Err(LedgerError::Unauthorized { role: "operator" })
        ));
    }

    #[test]
    fn test_revoke_role() {
        let (mut acl, root, operator, _) = setup();
        assert!(acl.revoke_role(&root, &operator, Role::Operator).unwrap());
        assert!(!acl.has_role(&operator, Role::Operator));
        assert!(!acl.revoke_role(&root, &operator, Role::Operator).unwrap());
    }

    #[test]
    fn test_only_root_manages_administrators() {
        let (mut acl, root, _, user) = setup();
        let admin = AccountId::from_name("admin2");
        acl.grant_role(&root, admin, Role::Administrator).unwrap();

        // A non-root administrator can manage operators but not administrators
        assert!(acl.grant_role(&admin, user, Role::Operator).is_ok());
        assert!(matches!(
            acl.grant_role(&admin, user, Role::Administrator),
            Err(LedgerError::Unauthorized { role: "root" })
        ));
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let (mut acl, _, operator, user) = setup();
        assert!(acl.grant_role(&operator, user, Role::EmergencyResponder).is_err());
        assert!(!acl.has_role(&user, Role::EmergencyResponder));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("emergency-responder".parse::<Role>().unwrap(), Role::EmergencyResponder);
        assert!("auditor".parse::<Role>().is_err());
    }
}
