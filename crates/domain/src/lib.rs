//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod evaluation;
mod lifecycle;
mod principal;
mod security;
mod submission;

pub use evaluation::{
    CourseId, Evaluation, EvaluationId, EvaluationInput, EvaluationPatch, EvaluationSnapshot,
    EvaluationStatus, EvaluationType, MAX_EVALUATION_WEIGHT, fields as evaluation_fields,
};
pub use lifecycle::{
    ChangedFields, FieldPolicy, GuardedEntity, LifecycleState, guard_update, guard_write,
};
pub use principal::Principal;
pub use security::{
    ALL_RESOURCES, Action, AuditAction, PermissionSet, RESOURCE_COURSES, RESOURCE_EVALUATIONS,
    RESOURCE_SUBMISSIONS, RequiredPermission, Role, RoleName,
};
pub use submission::{
    Answer, MAX_FEEDBACK_LENGTH, MAX_RESPONSE_LENGTH, Submission, SubmissionId, SubmissionPatch,
    SubmissionSnapshot, SubmissionStatus, fields as submission_fields, validate_score_within,
};
