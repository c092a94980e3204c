use assessa_application::{ConditionalWrite, SubmissionRepository};
use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::{EvaluationId, Submission, SubmissionId};
use async_trait::async_trait;

use super::InMemoryAssessmentRepository;

#[async_trait]
impl SubmissionRepository for InMemoryAssessmentRepository {
    async fn create_submission(&self, submission: Submission) -> AppResult<Submission> {
        let key = (submission.evaluation_id(), submission.student_id());
        let mut table = self.submissions.write().await;

        if table.by_student.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "student '{}' already submitted evaluation '{}'",
                key.1, key.0
            )));
        }

        table.by_student.insert(key, submission.id());
        table.rows.insert(submission.id(), submission.clone());
        Ok(submission)
    }

    async fn find_submission(&self, submission_id: SubmissionId) -> AppResult<Option<Submission>> {
        Ok(self
            .submissions
            .read()
            .await
            .rows
            .get(&submission_id)
            .cloned())
    }

    async fn find_student_submission(
        &self,
        evaluation_id: EvaluationId,
        student_id: UserId,
    ) -> AppResult<Option<Submission>> {
        let table = self.submissions.read().await;

        Ok(table
            .by_student
            .get(&(evaluation_id, student_id))
            .and_then(|submission_id| table.rows.get(submission_id))
            .cloned())
    }

    async fn update_submission(
        &self,
        expected_revision: i64,
        submission: Submission,
    ) -> AppResult<ConditionalWrite<Submission>> {
        let mut table = self.submissions.write().await;
        let stored = table.rows.get(&submission.id()).ok_or_else(|| {
            AppError::NotFound(format!("submission '{}' does not exist", submission.id()))
        })?;

        if stored.revision() != expected_revision {
            return Ok(ConditionalWrite::StaleRevision);
        }

        let saved = submission.with_revision(expected_revision + 1);
        table.rows.insert(saved.id(), saved.clone());
        Ok(ConditionalWrite::Committed(saved))
    }

    async fn list_evaluation_submissions(
        &self,
        evaluation_id: EvaluationId,
    ) -> AppResult<Vec<Submission>> {
        let table = self.submissions.read().await;

        let mut listed: Vec<Submission> = table
            .rows
            .values()
            .filter(|submission| submission.evaluation_id() == evaluation_id)
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.submitted_at()
                .cmp(&right.submitted_at())
                .then_with(|| left.id().cmp(&right.id()))
        });

        Ok(listed)
    }
}
