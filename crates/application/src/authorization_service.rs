use std::sync::Arc;

use assessa_core::{AppError, AppResult, UserIdentity};
use assessa_domain::{Action, AuditAction, Principal, RequiredPermission};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditRepository, RoleRepository};

mod decision;


pub use decision::{AllowReason, AuthorizationDecision, DenyReason, authorize};

/// Application service for role-based authorization checks.
#[derive(Clone)]
pub struct AuthorizationService {
    role_repository: Arc<dyn RoleRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl AuthorizationService {
    /// Creates a new authorization service from repository implementations.
    #[must_use]
    pub fn new(
        role_repository: Arc<dyn RoleRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            role_repository,
            audit_repository,
        }
    }

    /// Loads the identity's current role documents into a request-scoped principal.
    pub async fn resolve_principal(&self, identity: UserIdentity) -> AppResult<Principal> {
        let roles = self
            .role_repository
            .list_roles_for_subject(identity.user_id())
            .await?;

        Ok(Principal::new(identity, roles))
    }

    /// Ensures the principal holds one (resource, action) pair.
    pub async fn require_permission(
        &self,
        principal: &Principal,
        resource: &str,
        action: Action,
    ) -> AppResult<()> {
        self.require_permissions(principal, &[RequiredPermission::new(resource, action)])
            .await
    }

    /// Ensures one of the principal's active roles holds every required pair.
    ///
    /// Denials are logged and audited. The returned error names the failing
    /// pair but never the principal's roles.
    pub async fn require_permissions(
        &self,
        principal: &Principal,
        required: &[RequiredPermission],
    ) -> AppResult<()> {
        let reason = match authorize(principal.roles(), required) {
            AuthorizationDecision::Allow(reason) => {
                debug!(
                    subject = %principal.user_id(),
                    reason = ?reason,
                    "authorization granted"
                );
                return Ok(());
            }
            AuthorizationDecision::Deny(reason) => reason,
        };

        let role_names: Vec<&str> = principal
            .roles()
            .iter()
            .map(|role| role.name().as_str())
            .collect();
        debug!(subject = %principal.user_id(), roles = ?role_names, "denied principal roles");
        warn!(
            subject = %principal.user_id(),
            reason = ?reason,
            "authorization denied"
        );

        let message = deny_message(&reason, required);
        self.audit_repository
            .append_event(AuditEvent {
                subject: principal.user_id(),
                action: AuditAction::AuthorizationDenied,
                resource_type: "authorization".to_owned(),
                resource_id: required
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
                detail: Some(message.clone()),
            })
            .await?;

        Err(AppError::Forbidden(format!(
            "subject '{}' {message}",
            principal.user_id()
        )))
    }

    /// Returns whether the principal holds every required pair, without auditing.
    #[must_use]
    pub fn has_permissions(&self, principal: &Principal, required: &[RequiredPermission]) -> bool {
        authorize(principal.roles(), required).is_allowed()
    }
}

fn deny_message(reason: &DenyReason, required: &[RequiredPermission]) -> String {
    match reason {
        DenyReason::NoActiveRoles => "has no active role".to_owned(),
        DenyReason::Missing(pair) => format!("is missing permission '{pair}'"),
        DenyReason::SplitAcrossRoles => format!(
            "does not hold permissions '{}' through a single role",
            required
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
