use std::sync::Arc;

use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::{
    Action, Answer, AuditAction, ChangedFields, Evaluation, EvaluationId, Principal,
    RESOURCE_SUBMISSIONS, Submission, SubmissionId, SubmissionPatch, SubmissionStatus,
    guard_update, validate_score_within,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    AuditEvent, AuditRepository, AuthorizationService, ConditionalWrite, EnrollmentRepository,
    EvaluationRepository, MAX_WRITE_ATTEMPTS, SubmissionRepository,
};


/// Grade awarded by an instructor.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeInput {
    /// Awarded score, at most the evaluation's total marks.
    pub total_score: f64,
    /// Optional written feedback.
    pub feedback: Option<String>,
}

/// Application service owning the submission lifecycle.
#[derive(Clone)]
pub struct SubmissionService {
    authorization_service: AuthorizationService,
    submission_repository: Arc<dyn SubmissionRepository>,
    evaluation_repository: Arc<dyn EvaluationRepository>,
    enrollment_repository: Arc<dyn EnrollmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl SubmissionService {
    /// Creates a new submission service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        submission_repository: Arc<dyn SubmissionRepository>,
        evaluation_repository: Arc<dyn EvaluationRepository>,
        enrollment_repository: Arc<dyn EnrollmentRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            authorization_service,
            submission_repository,
            evaluation_repository,
            enrollment_repository,
            audit_repository,
        }
    }

    /// Applies a proposed write to the submission of `student_id` for an evaluation.
    ///
    /// Without an existing submission the write creates one and may carry only
    /// answers. A student repeating an answers-only write is a creation attempt
    /// and fails on the uniqueness check. Any other write to an existing
    /// submission is checked against the submission lifecycle.
    pub async fn propose_submission_write(
        &self,
        actor: &Principal,
        student_id: UserId,
        evaluation_id: EvaluationId,
        patch: SubmissionPatch,
    ) -> AppResult<Submission> {
        let existing = self
            .submission_repository
            .find_student_submission(evaluation_id, student_id)
            .await?;

        match existing {
            Some(submission)
                if actor.user_id() != student_id || !is_creation_shaped(&patch) =>
            {
                self.update_submission(actor, submission.id(), patch).await
            }
            _ => {
                self.create_submission(actor, student_id, evaluation_id, patch)
                    .await
            }
        }
    }

    /// Submits the acting student's answers for an evaluation.
    pub async fn submit(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
        answers: Vec<Answer>,
    ) -> AppResult<Submission> {
        self.create_submission(
            actor,
            actor.user_id(),
            evaluation_id,
            SubmissionPatch {
                answers: Some(answers),
                ..SubmissionPatch::default()
            },
        )
        .await
    }

    /// Grades a submission, stamping the grader and grading time.
    pub async fn grade_submission(
        &self,
        actor: &Principal,
        submission_id: SubmissionId,
        grade: GradeInput,
    ) -> AppResult<Submission> {
        self.update_submission(
            actor,
            submission_id,
            SubmissionPatch {
                answers: None,
                total_score: Some(grade.total_score),
                feedback: grade.feedback,
                status: Some(SubmissionStatus::Graded),
            },
        )
        .await
    }

    /// Returns one submission to its student, the evaluation's instructor or an override principal.
    pub async fn get_submission(
        &self,
        actor: &Principal,
        submission_id: SubmissionId,
    ) -> AppResult<Submission> {
        self.authorization_service
            .require_permission(actor, RESOURCE_SUBMISSIONS, Action::Read)
            .await?;

        let submission = self.load_submission(submission_id).await?;
        if submission.student_id() == actor.user_id() {
            return Ok(submission);
        }

        let evaluation = self.load_evaluation(submission.evaluation_id()).await?;
        if is_grader(actor, &evaluation) {
            return Ok(submission);
        }

        Err(submission_not_found(submission_id))
    }

    /// Lists every submission of an evaluation for its instructor.
    pub async fn list_evaluation_submissions(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
    ) -> AppResult<Vec<Submission>> {
        self.authorization_service
            .require_permission(actor, RESOURCE_SUBMISSIONS, Action::Read)
            .await?;

        let evaluation = self.load_evaluation(evaluation_id).await?;
        ensure_grader(actor, &evaluation)?;

        self.submission_repository
            .list_evaluation_submissions(evaluation_id)
            .await
    }

    async fn create_submission(
        &self,
        actor: &Principal,
        student_id: UserId,
        evaluation_id: EvaluationId,
        patch: SubmissionPatch,
    ) -> AppResult<Submission> {
        self.authorization_service
            .require_permission(actor, RESOURCE_SUBMISSIONS, Action::Create)
            .await?;

        if actor.user_id() != student_id {
            return Err(AppError::Forbidden(format!(
                "subject '{}' cannot submit on behalf of '{student_id}'",
                actor.user_id()
            )));
        }

        let evaluation = self
            .evaluation_repository
            .find_evaluation(evaluation_id)
            .await?
            .filter(|evaluation| !evaluation.is_deleted())
            .ok_or_else(|| evaluation_not_found(evaluation_id))?;

        let enrolled = self
            .enrollment_repository
            .is_enrolled(evaluation.course_id(), student_id)
            .await?;
        if !enrolled || !evaluation.is_visible_to_students() {
            return Err(evaluation_not_found(evaluation_id));
        }

        let now = Utc::now();
        if !evaluation.accepts_submissions() {
            return Err(AppError::Validation(format!(
                "evaluation '{evaluation_id}' is not accepting submissions"
            )));
        }
        if let Some(due_at) = evaluation.due_at()
            && due_at <= now
        {
            return Err(AppError::Validation(format!(
                "evaluation '{evaluation_id}' was due at {due_at}"
            )));
        }

        let answers = creation_answers(patch)?;
        let submission = Submission::new(evaluation_id, student_id, answers, now)?;
        let submission = self
            .submission_repository
            .create_submission(submission)
            .await
            .inspect_err(|error| {
                if matches!(error, AppError::Conflict(_)) {
                    warn!(
                        evaluation_id = %evaluation_id,
                        student_id = %student_id,
                        "duplicate submission rejected"
                    );
                }
            })?;

        self.audit_repository
            .append_event(AuditEvent {
                subject: actor.user_id(),
                action: AuditAction::SubmissionCreated,
                resource_type: "submission".to_owned(),
                resource_id: submission.id().to_string(),
                detail: Some(format!(
                    "submitted {} answer(s) for evaluation '{evaluation_id}'",
                    submission.answers().len()
                )),
            })
            .await?;

        info!(
            submission_id = %submission.id(),
            evaluation_id = %evaluation_id,
            student_id = %student_id,
            "submission created"
        );

        Ok(submission)
    }

    async fn update_submission(
        &self,
        actor: &Principal,
        submission_id: SubmissionId,
        patch: SubmissionPatch,
    ) -> AppResult<Submission> {
        self.authorization_service
            .require_permission(actor, RESOURCE_SUBMISSIONS, Action::Update)
            .await?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let before = self.load_submission(submission_id).await?;
            let evaluation = self.load_evaluation(before.evaluation_id()).await?;
            ensure_grader(actor, &evaluation)?;

            let after = before.apply_patch(&patch, actor.user_id(), Utc::now())?;
            let changed = guard_update(&before, &after).inspect_err(|error| {
                warn!(
                    submission_id = %submission_id,
                    subject = %actor.user_id(),
                    status = ?before.status(),
                    error = %error,
                    "submission write rejected"
                );
            })?;

            if let Some(total_score) = patch.total_score {
                validate_score_within(total_score, evaluation.total_marks())?;
            }

            if changed.is_empty() {
                return Ok(before);
            }

            match self
                .submission_repository
                .update_submission(before.revision(), after)
                .await?
            {
                ConditionalWrite::Committed(saved) => {
                    self.append_write_event(actor, &before, &saved, &changed)
                        .await?;
                    info!(
                        submission_id = %submission_id,
                        status = ?saved.status(),
                        revision = saved.revision(),
                        "submission write committed"
                    );
                    return Ok(saved);
                }
                ConditionalWrite::StaleRevision => {
                    debug!(
                        submission_id = %submission_id,
                        attempt,
                        "submission changed concurrently, reloading snapshot"
                    );
                }
            }
        }

        Err(AppError::Conflict(format!(
            "submission '{submission_id}' kept changing concurrently; write abandoned after {MAX_WRITE_ATTEMPTS} attempts"
        )))
    }

    async fn load_submission(&self, submission_id: SubmissionId) -> AppResult<Submission> {
        self.submission_repository
            .find_submission(submission_id)
            .await?
            .ok_or_else(|| submission_not_found(submission_id))
    }

    async fn load_evaluation(&self, evaluation_id: EvaluationId) -> AppResult<Evaluation> {
        self.evaluation_repository
            .find_evaluation(evaluation_id)
            .await?
            .ok_or_else(|| evaluation_not_found(evaluation_id))
    }

    async fn append_write_event(
        &self,
        actor: &Principal,
        before: &Submission,
        saved: &Submission,
        changed: &ChangedFields,
    ) -> AppResult<()> {
        let action = if before.status() != saved.status()
            && saved.status() == SubmissionStatus::Graded
        {
            AuditAction::SubmissionGraded
        } else {
            AuditAction::SubmissionUpdated
        };

        self.audit_repository
            .append_event(AuditEvent {
                subject: actor.user_id(),
                action,
                resource_type: "submission".to_owned(),
                resource_id: saved.id().to_string(),
                detail: Some(format!(
                    "changed fields: {}",
                    changed.iter().collect::<Vec<_>>().join(", ")
                )),
            })
            .await
    }
}

fn is_creation_shaped(patch: &SubmissionPatch) -> bool {
    patch.total_score.is_none()
        && patch.feedback.is_none()
        && patch
            .status
            .is_none_or(|status| status == SubmissionStatus::Submitted)
}

fn creation_answers(patch: SubmissionPatch) -> AppResult<Vec<Answer>> {
    if !is_creation_shaped(&patch) {
        return Err(AppError::Validation(
            "a new submission may only carry answers".to_owned(),
        ));
    }

    patch
        .answers
        .ok_or_else(|| AppError::Validation("a new submission requires answers".to_owned()))
}

fn is_grader(actor: &Principal, evaluation: &Evaluation) -> bool {
    evaluation.instructor_id() == actor.user_id() || actor.has_override()
}

fn ensure_grader(actor: &Principal, evaluation: &Evaluation) -> AppResult<()> {
    if is_grader(actor, evaluation) {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "subject '{}' does not grade evaluation '{}'",
        actor.user_id(),
        evaluation.id()
    )))
}

fn submission_not_found(submission_id: SubmissionId) -> AppError {
    AppError::NotFound(format!("submission '{submission_id}' does not exist"))
}

fn evaluation_not_found(evaluation_id: EvaluationId) -> AppError {
    AppError::NotFound(format!("evaluation '{evaluation_id}' does not exist"))
}
