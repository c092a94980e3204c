//! In-crate fakes for application port tests.

use std::collections::{HashMap, HashSet};

use assessa_core::{AppError, AppResult, UserId, UserIdentity};
use assessa_domain::{
    CourseId, Evaluation, EvaluationId, Principal, Role, RoleName, Submission, SubmissionId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    AuditEvent, AuditRepository, ConditionalWrite, EnrollmentRepository, EvaluationRepository,
    RoleRepository, SubmissionRepository,
};

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRoleRepository;

#[async_trait]
impl RoleRepository for FakeRoleRepository {
    async fn list_roles_for_subject(&self, _subject: UserId) -> AppResult<Vec<Role>> {
        Ok(Vec::new())
    }

    async fn save_role(&self, _role: Role) -> AppResult<()> {
        Ok(())
    }

    async fn assign_role(&self, _subject: UserId, _role_name: RoleName) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeEnrollmentRepository {
    pub(crate) enrollments: Mutex<HashSet<(CourseId, UserId)>>,
}

#[async_trait]
impl EnrollmentRepository for FakeEnrollmentRepository {
    async fn is_enrolled(&self, course_id: CourseId, user_id: UserId) -> AppResult<bool> {
        Ok(self
            .enrollments
            .lock()
            .await
            .contains(&(course_id, user_id)))
    }
}

/// Evaluation store whose next update can be preceded by a competing write.
#[derive(Default)]
pub(crate) struct FakeEvaluationRepository {
    pub(crate) evaluations: Mutex<HashMap<EvaluationId, Evaluation>>,
    pub(crate) competing_writes: Mutex<Vec<Evaluation>>,
}

#[async_trait]
impl EvaluationRepository for FakeEvaluationRepository {
    async fn create_evaluation(&self, evaluation: Evaluation) -> AppResult<Evaluation> {
        self.evaluations
            .lock()
            .await
            .insert(evaluation.id(), evaluation.clone());
        Ok(evaluation)
    }

    async fn find_evaluation(&self, evaluation_id: EvaluationId) -> AppResult<Option<Evaluation>> {
        Ok(self.evaluations.lock().await.get(&evaluation_id).cloned())
    }

    async fn update_evaluation(
        &self,
        expected_revision: i64,
        evaluation: Evaluation,
    ) -> AppResult<ConditionalWrite<Evaluation>> {
        let mut evaluations = self.evaluations.lock().await;

        if let Some(competing) = self.competing_writes.lock().await.pop() {
            let revision = evaluations
                .get(&competing.id())
                .map(|stored| stored.revision() + 1)
                .unwrap_or(1);
            evaluations.insert(competing.id(), competing.with_revision(revision));
        }

        let stored = evaluations.get(&evaluation.id()).ok_or_else(|| {
            AppError::NotFound(format!("evaluation '{}' does not exist", evaluation.id()))
        })?;
        if stored.revision() != expected_revision {
            return Ok(ConditionalWrite::StaleRevision);
        }

        let saved = evaluation.with_revision(expected_revision + 1);
        evaluations.insert(saved.id(), saved.clone());
        Ok(ConditionalWrite::Committed(saved))
    }

    async fn list_course_evaluations(&self, course_id: CourseId) -> AppResult<Vec<Evaluation>> {
        let mut listed: Vec<Evaluation> = self
            .evaluations
            .lock()
            .await
            .values()
            .filter(|evaluation| evaluation.course_id() == course_id && !evaluation.is_deleted())
            .cloned()
            .collect();
        listed.sort_by_key(Evaluation::created_at);
        Ok(listed)
    }

    async fn list_evaluations_due_for_closing(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Evaluation>> {
        Ok(self
            .evaluations
            .lock()
            .await
            .values()
            .filter(|evaluation| {
                evaluation.accepts_submissions()
                    && evaluation.due_at().is_some_and(|due_at| due_at <= now)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Submission store whose next update can be preceded by a competing write.
#[derive(Default)]
pub(crate) struct FakeSubmissionRepository {
    pub(crate) submissions: Mutex<HashMap<SubmissionId, Submission>>,
    pub(crate) competing_writes: Mutex<Vec<Submission>>,
}

#[async_trait]
impl SubmissionRepository for FakeSubmissionRepository {
    async fn create_submission(&self, submission: Submission) -> AppResult<Submission> {
        let mut submissions = self.submissions.lock().await;
        let duplicate = submissions.values().any(|stored| {
            stored.evaluation_id() == submission.evaluation_id()
                && stored.student_id() == submission.student_id()
        });
        if duplicate {
            return Err(AppError::Conflict("duplicate submission".to_owned()));
        }

        submissions.insert(submission.id(), submission.clone());
        Ok(submission)
    }

    async fn find_submission(&self, submission_id: SubmissionId) -> AppResult<Option<Submission>> {
        Ok(self.submissions.lock().await.get(&submission_id).cloned())
    }

    async fn find_student_submission(
        &self,
        evaluation_id: EvaluationId,
        student_id: UserId,
    ) -> AppResult<Option<Submission>> {
        Ok(self
            .submissions
            .lock()
            .await
            .values()
            .find(|stored| {
                stored.evaluation_id() == evaluation_id && stored.student_id() == student_id
            })
            .cloned())
    }

    async fn update_submission(
        &self,
        expected_revision: i64,
        submission: Submission,
    ) -> AppResult<ConditionalWrite<Submission>> {
        let mut submissions = self.submissions.lock().await;

        if let Some(competing) = self.competing_writes.lock().await.pop() {
            let revision = submissions
                .get(&competing.id())
                .map(|stored| stored.revision() + 1)
                .unwrap_or(1);
            submissions.insert(competing.id(), competing.with_revision(revision));
        }

        let stored = submissions.get(&submission.id()).ok_or_else(|| {
            AppError::NotFound(format!("submission '{}' does not exist", submission.id()))
        })?;
        if stored.revision() != expected_revision {
            return Ok(ConditionalWrite::StaleRevision);
        }

        let saved = submission.with_revision(expected_revision + 1);
        submissions.insert(saved.id(), saved.clone());
        Ok(ConditionalWrite::Committed(saved))
    }

    async fn list_evaluation_submissions(
        &self,
        evaluation_id: EvaluationId,
    ) -> AppResult<Vec<Submission>> {
        let mut listed: Vec<Submission> = self
            .submissions
            .lock()
            .await
            .values()
            .filter(|stored| stored.evaluation_id() == evaluation_id)
            .cloned()
            .collect();
        listed.sort_by_key(Submission::submitted_at);
        Ok(listed)
    }
}

pub(crate) fn principal_with(name: RoleName) -> Principal {
    let role = Role::default_catalog()
        .unwrap_or_default()
        .into_iter()
        .find(|role| role.name() == name)
        .unwrap_or_else(|| unreachable!());

    Principal::new(
        UserIdentity::new(UserId::new(), name.as_str(), None),
        vec![role],
    )
}
