use std::collections::{BTreeMap, HashMap, HashSet};

use assessa_application::AuditEvent;
use assessa_core::UserId;
use assessa_domain::{CourseId, Evaluation, EvaluationId, Role, RoleName, Submission, SubmissionId};
use tokio::sync::RwLock;

mod directory;
mod evaluations;
mod submissions;


/// In-memory implementation of every assessment port.
///
/// Conditional updates and submission uniqueness are decided under a single
/// write lock, which gives the same atomicity as the PostgreSQL adapters.
#[derive(Debug, Default)]
pub struct InMemoryAssessmentRepository {
    evaluations: RwLock<HashMap<EvaluationId, Evaluation>>,
    submissions: RwLock<SubmissionTable>,
    roles: RwLock<BTreeMap<RoleName, Role>>,
    subject_roles: RwLock<HashMap<UserId, Vec<RoleName>>>,
    enrollments: RwLock<HashSet<(CourseId, UserId)>>,
    audit_events: RwLock<Vec<AuditEvent>>,
}

#[derive(Debug, Default)]
struct SubmissionTable {
    rows: HashMap<SubmissionId, Submission>,
    by_student: HashMap<(EvaluationId, UserId), SubmissionId>,
}

impl InMemoryAssessmentRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a course enrollment.
    pub async fn enroll(&self, course_id: CourseId, user_id: UserId) {
        self.enrollments.write().await.insert((course_id, user_id));
    }

    /// Returns a copy of every appended audit event in append order.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit_events.read().await.clone()
    }
}
