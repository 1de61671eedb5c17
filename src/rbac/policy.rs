use std::collections::BTreeSet;

use bitflags::bitflags;

use super::permission::{Permission, Permissions};

bitflags! {
    /// How a route combines its required roles with its required permissions.
    ///
    /// Exactly one flag must be set. Any other value denies access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RbacPolicy: u16 {
        /// Any required role, or the required permissions.
        const PERMISSIONS_OR_ROLE       = 1 << 0;
        /// All required roles, or the required permissions.
        const PERMISSIONS_OR_ALL_ROLES  = 1 << 1;
        /// Any required role, and the required permissions.
        const PERMISSIONS_AND_ROLE      = 1 << 2;
        /// All required roles, and the required permissions.
        const PERMISSIONS_AND_ALL_ROLES = 1 << 3;
        /// Required permissions only. Roles only contribute their permissions.
        const PERMISSIONS_ONLY          = 1 << 4;
        /// Any required role. Permissions are not consulted.
        const ROLE_ONLY                 = 1 << 5;
    }
}

impl Default for RbacPolicy {
    fn default() -> Self {
        Self::PERMISSIONS_OR_ROLE
    }
}

/// Role matching mode derived from a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoleMatch {
    Any,
    All,
}

/// How a policy combines the role and permission verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Or(RoleMatch),
    And(RoleMatch),
    PermissionsOnly,
    RoleOnly,
}

impl RbacPolicy {
    /// `None` for unknown or combined flags.
    pub(crate) fn combinator(self) -> Option<Combinator> {
        if self == Self::PERMISSIONS_OR_ROLE {
            Some(Combinator::Or(RoleMatch::Any))
        } else if self == Self::PERMISSIONS_OR_ALL_ROLES {
            Some(Combinator::Or(RoleMatch::All))
        } else if self == Self::PERMISSIONS_AND_ROLE {
            Some(Combinator::And(RoleMatch::Any))
        } else if self == Self::PERMISSIONS_AND_ALL_ROLES {
            Some(Combinator::And(RoleMatch::All))
        } else if self == Self::PERMISSIONS_ONLY {
            Some(Combinator::PermissionsOnly)
        } else if self == Self::ROLE_ONLY {
            Some(Combinator::RoleOnly)
        } else {
            None
        }
    }
}

/// What a route demands of the subject.
///
/// Permissions are flattened once here. An absent permission requirement
/// differs from a declared empty one, which every subject satisfies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    permissions: Option<Permission>,
    roles: BTreeSet<String>,
    policy: RbacPolicy,
}

impl Requirement {
    #[must_use]
    pub fn new(policy: RbacPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: &Permissions) -> Self {
        let flat = permissions.flatten();
        self.permissions = Some(match self.permissions.take() {
            Some(existing) => existing.or(&flat),
            None => flat,
        });
        self
    }

    #[must_use]
    pub fn with_permission(self, permission: Permission) -> Self {
        self.with_permissions(&Permissions::from(vec![permission]))
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RbacPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn permissions(&self) -> Option<&Permission> {
        self.permissions.as_ref()
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn policy(&self) -> RbacPolicy {
        self.policy
    }

    /// Nothing is required, so no lookup is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_none() && self.roles.is_empty()
    }

    /// Role verdict. `true` when no roles are required.
    pub(crate) fn roles_match(&self, subject_roles: &[String], mode: RoleMatch) -> bool {
        if self.roles.is_empty() {
            return true;
        }
        match mode {
            RoleMatch::Any => subject_roles.iter().any(|r| self.roles.contains(r)),
            RoleMatch::All => self
                .roles
                .iter()
                .all(|required| subject_roles.iter().any(|r| r == required)),
        }
    }
}
