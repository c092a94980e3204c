//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_assessment_repository;
mod postgres_audit_repository;
mod postgres_enrollment_repository;
mod postgres_evaluation_repository;
mod postgres_role_repository;
mod postgres_submission_repository;

pub use in_memory_assessment_repository::InMemoryAssessmentRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_enrollment_repository::PostgresEnrollmentRepository;
pub use postgres_evaluation_repository::PostgresEvaluationRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use postgres_submission_repository::PostgresSubmissionRepository;
