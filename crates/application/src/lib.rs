//! Application services and ports.

#![forbid(unsafe_code)]

mod assessment_ports;
mod authorization_service;
mod evaluation_service;
mod submission_service;

#[cfg(test)]
mod test_support;

pub use assessment_ports::{
    AuditEvent, AuditRepository, ConditionalWrite, EnrollmentRepository, EvaluationRepository,
    RoleRepository, SubmissionRepository,
};
pub use authorization_service::{
    AllowReason, AuthorizationDecision, AuthorizationService, DenyReason, authorize,
};
pub use evaluation_service::{EvaluationService, MAX_WRITE_ATTEMPTS};
pub use submission_service::{GradeInput, SubmissionService};
