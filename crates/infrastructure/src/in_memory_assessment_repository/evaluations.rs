use assessa_application::{ConditionalWrite, EvaluationRepository};
use assessa_core::{AppError, AppResult};
use assessa_domain::{CourseId, Evaluation, EvaluationId, EvaluationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::InMemoryAssessmentRepository;

#[async_trait]
impl EvaluationRepository for InMemoryAssessmentRepository {
    async fn create_evaluation(&self, evaluation: Evaluation) -> AppResult<Evaluation> {
        let mut evaluations = self.evaluations.write().await;

        if evaluations.contains_key(&evaluation.id()) {
            return Err(AppError::Conflict(format!(
                "evaluation '{}' already exists",
                evaluation.id()
            )));
        }

        evaluations.insert(evaluation.id(), evaluation.clone());
        Ok(evaluation)
    }

    async fn find_evaluation(&self, evaluation_id: EvaluationId) -> AppResult<Option<Evaluation>> {
        Ok(self.evaluations.read().await.get(&evaluation_id).cloned())
    }

    async fn update_evaluation(
        &self,
        expected_revision: i64,
        evaluation: Evaluation,
    ) -> AppResult<ConditionalWrite<Evaluation>> {
        let mut evaluations = self.evaluations.write().await;
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
        let evaluations = self.evaluations.read().await;

        let mut listed: Vec<Evaluation> = evaluations
            .values()
            .filter(|evaluation| evaluation.course_id() == course_id && !evaluation.is_deleted())
            .cloned()
            .collect();
        listed.sort_by(|left, right| {
            left.created_at()
                .cmp(&right.created_at())
                .then_with(|| left.id().cmp(&right.id()))
        });

        Ok(listed)
    }

    async fn list_evaluations_due_for_closing(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Evaluation>> {
        let evaluations = self.evaluations.read().await;

        let mut due: Vec<Evaluation> = evaluations
            .values()
            .filter(|evaluation| {
                evaluation.status() == EvaluationStatus::Published
                    && !evaluation.is_deleted()
                    && evaluation.due_at().is_some_and(|due_at| due_at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(Evaluation::due_at);
        due.truncate(limit);

        Ok(due)
    }
}
