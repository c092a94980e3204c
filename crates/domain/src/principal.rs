use assessa_core::{UserId, UserIdentity};
use serde::{Deserialize, Serialize};

use crate::Role;

/// Authenticated actor with its resolved role documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    identity: UserIdentity,
    roles: Vec<Role>,
}

impl Principal {
    /// Creates a principal from an identity and the roles loaded for it.
    #[must_use]
    pub fn new(identity: UserIdentity, roles: Vec<Role>) -> Self {
        Self { identity, roles }
    }

    /// Returns the underlying identity.
    #[must_use]
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Returns the principal's user id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.identity.user_id()
    }

    /// Returns every attached role, including disabled ones.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Returns roles that take part in authorization decisions.
    pub fn active_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|role| role.is_active())
    }

    /// Returns whether an active role bypasses ownership rules.
    ///
    /// Holds for an active admin role or an active role carrying `all:manage`.
    #[must_use]
    pub fn has_override(&self) -> bool {
        self.active_roles()
            .any(|role| role.is_admin() || role.has_wildcard_manage())
    }
}
