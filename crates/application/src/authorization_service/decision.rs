use assessa_domain::{RequiredPermission, Role, RoleName};

/// Why a principal was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// An active admin role short-circuited the check.
    AdminRole,
    /// An active role holds the `all:manage` grant.
    WildcardManage,
    /// One active role grants every required pair.
    RoleGrant(RoleName),
}

/// Why a principal was denied. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The principal has no active role.
    NoActiveRoles,
    /// No active role grants this pair.
    Missing(RequiredPermission),
    /// Every pair is granted somewhere, but no single role grants all of them.
    SplitAcrossRoles,
}

/// Outcome of [`authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// The principal may proceed.
    Allow(AllowReason),
    /// The principal is blocked.
    Deny(DenyReason),
}

impl AuthorizationDecision {
    /// Returns whether the decision allows the request.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Decides whether roles satisfy every required (resource, action) pair.
///
/// Disabled roles are ignored. An active admin role and an active `all:manage`
/// entry allow everything. Otherwise one single role must grant every pair;
/// grants are never combined across roles.
pub fn authorize<'a>(
    roles: impl IntoIterator<Item = &'a Role>,
    required: &[RequiredPermission],
) -> AuthorizationDecision {
    let active: Vec<&Role> = roles.into_iter().filter(|role| role.is_active()).collect();

    if active.iter().any(|role| role.is_admin()) {
        return AuthorizationDecision::Allow(AllowReason::AdminRole);
    }

    if active.iter().any(|role| role.has_wildcard_manage()) {
        return AuthorizationDecision::Allow(AllowReason::WildcardManage);
    }

    if active.is_empty() {
        return AuthorizationDecision::Deny(DenyReason::NoActiveRoles);
    }

    if let Some(role) = active
        .iter()
        .find(|role| required.iter().all(|pair| role.grants(pair)))
    {
        return AuthorizationDecision::Allow(AllowReason::RoleGrant(role.name()));
    }

    match required
        .iter()
        .find(|pair| !active.iter().any(|role| role.grants(pair)))
    {
        Some(missing) => AuthorizationDecision::Deny(DenyReason::Missing(missing.clone())),
        None => AuthorizationDecision::Deny(DenyReason::SplitAcrossRoles),
    }
}
