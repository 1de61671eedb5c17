use std::collections::BTreeSet;

use crate::rbac::{Permission, Permissions, RbacPolicy, Requirement};

/// Per-route session, CSRF and RBAC requirements.
///
/// Defaults are strict: a session and a CSRF token are required.
///
/// `allow` and `block` act on the session mode claim. A non-empty allow
/// list admits only its modes. Otherwise any mode not in the block list
/// is admitted.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub(crate) allow: BTreeSet<String>,
    pub(crate) block: BTreeSet<String>,
    pub(crate) requirement: Requirement,
    pub(crate) session_required: bool,
    pub(crate) require_csrf: bool,
    pub(crate) manual_response: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            allow: BTreeSet::new(),
            block: BTreeSet::new(),
            requirement: Requirement::default(),
            session_required: true,
            require_csrf: true,
            manual_response: false,
        }
    }
}

impl RouteConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No session and no CSRF token required.
    #[must_use]
    pub fn public() -> Self {
        Self::new().with_session_required(false).with_require_csrf(false)
    }

    #[must_use]
    pub fn allow<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(modes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn block<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.block.extend(modes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: &Permissions) -> Self {
        self.requirement = self.requirement.with_permissions(permissions);
        self
    }

    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.requirement = self.requirement.with_permission(permission);
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirement = self.requirement.with_roles(roles);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RbacPolicy) -> Self {
        self.requirement = self.requirement.with_policy(policy);
        self
    }

    #[must_use]
    pub fn with_session_required(mut self, required: bool) -> Self {
        self.session_required = required;
        self
    }

    #[must_use]
    pub fn with_require_csrf(mut self, required: bool) -> Self {
        self.require_csrf = required;
        self
    }

    /// Skip serializing [`Reply::Data`](super::Reply::Data). The handler owns the response.
    #[must_use]
    pub fn with_manual_response(mut self, manual: bool) -> Self {
        self.manual_response = manual;
        self
    }

    #[must_use]
    pub fn allowed_modes(&self) -> &BTreeSet<String> {
        &self.allow
    }

    #[must_use]
    pub fn blocked_modes(&self) -> &BTreeSet<String> {
        &self.block
    }

    #[must_use]
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    #[must_use]
    pub fn session_required(&self) -> bool {
        self.session_required
    }

    #[must_use]
    pub fn require_csrf(&self) -> bool {
        self.require_csrf
    }

    #[must_use]
    pub fn manual_response(&self) -> bool {
        self.manual_response
    }

    /// Allow list first, then block list.
    #[must_use]
    pub fn admits_mode(&self, mode: &str) -> bool {
        if self.allow.contains(mode) {
            return true;
        }
        if !self.allow.is_empty() {
            return false;
        }
        !self.block.contains(mode)
    }
}
