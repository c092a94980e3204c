use assessa_core::{AppResult, UserId};
use assessa_domain::{CourseId, Evaluation, EvaluationId, Submission, SubmissionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of a write conditioned on the stored revision.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWrite<T> {
    /// The write was applied; carries the stored value with its new revision.
    Committed(T),
    /// The stored revision moved since the snapshot was read.
    StaleRevision,
}

/// Repository port for evaluation documents.
#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    /// Inserts a new evaluation.
    async fn create_evaluation(&self, evaluation: Evaluation) -> AppResult<Evaluation>;

    /// Finds an evaluation by id, including soft-deleted ones.
    async fn find_evaluation(&self, evaluation_id: EvaluationId) -> AppResult<Option<Evaluation>>;

    /// Replaces an evaluation if its stored revision still equals `expected_revision`.
    ///
    /// Returns `NotFound` when the evaluation does not exist.
    async fn update_evaluation(
        &self,
        expected_revision: i64,
        evaluation: Evaluation,
    ) -> AppResult<ConditionalWrite<Evaluation>>;

    /// Lists non-deleted evaluations of a course ordered by creation time.
    async fn list_course_evaluations(&self, course_id: CourseId) -> AppResult<Vec<Evaluation>>;

    /// Lists published, non-deleted evaluations whose deadline is at or before `now`.
    async fn list_evaluations_due_for_closing(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Evaluation>>;
}

/// Repository port for submission documents.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Inserts a new submission.
    ///
    /// Must fail with `Conflict` when the (student, evaluation) pair already
    /// has a submission, atomically with respect to concurrent callers.
    async fn create_submission(&self, submission: Submission) -> AppResult<Submission>;

    /// Finds a submission by id.
    async fn find_submission(&self, submission_id: SubmissionId) -> AppResult<Option<Submission>>;

    /// Finds the submission of one student for one evaluation.
    async fn find_student_submission(
        &self,
        evaluation_id: EvaluationId,
        student_id: UserId,
    ) -> AppResult<Option<Submission>>;

    /// Replaces a submission if its stored revision still equals `expected_revision`.
    ///
    /// Returns `NotFound` when the submission does not exist.
    async fn update_submission(
        &self,
        expected_revision: i64,
        submission: Submission,
    ) -> AppResult<ConditionalWrite<Submission>>;

    /// Lists submissions of an evaluation ordered by submission time.
    async fn list_evaluation_submissions(
        &self,
        evaluation_id: EvaluationId,
    ) -> AppResult<Vec<Submission>>;
}
