mod audit;
mod directory;
mod repositories;

pub use audit::{AuditEvent, AuditRepository};
pub use directory::{EnrollmentRepository, RoleRepository};
pub use repositories::{ConditionalWrite, EvaluationRepository, SubmissionRepository};
