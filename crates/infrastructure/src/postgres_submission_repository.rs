use std::str::FromStr;

use assessa_application::{ConditionalWrite, SubmissionRepository};
use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::{
    Answer, EvaluationId, LifecycleState, Submission, SubmissionId, SubmissionSnapshot,
    SubmissionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// PostgreSQL-backed submission repository.
///
/// One-submission-per-student is enforced by the `submissions_one_per_student`
/// unique constraint, so concurrent first submissions race inside the database.
#[derive(Clone)]
pub struct PostgresSubmissionRepository {
    pool: PgPool,
}

impl PostgresSubmissionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SUBMISSION_COLUMNS: &str = r#"
    id,
    evaluation_id,
    student_id,
    answers,
    submitted_at,
    status,
    total_score,
    feedback,
    graded_by,
    graded_at,
    revision
"#;

#[derive(Debug, FromRow)]
struct SubmissionRow {
    id: Uuid,
    evaluation_id: Uuid,
    student_id: Uuid,
    answers: Json<Vec<AnswerDocument>>,
    submitted_at: DateTime<Utc>,
    status: String,
    total_score: Option<f64>,
    feedback: Option<String>,
    graded_by: Option<Uuid>,
    graded_at: Option<DateTime<Utc>>,
    revision: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnswerDocument {
    question_id: String,
    response_text: String,
}

impl From<&Answer> for AnswerDocument {
    fn from(answer: &Answer) -> Self {
        Self {
            question_id: answer.question_id().to_owned(),
            response_text: answer.response_text().to_owned(),
        }
    }
}

impl SubmissionRow {
    fn into_submission(self) -> AppResult<Submission> {
        let answers = self
            .answers
            .0
            .into_iter()
            .map(|document| Answer::new(document.question_id, document.response_text))
            .collect::<AppResult<Vec<_>>>()
            .map_err(|error| {
                AppError::Internal(format!(
                    "submission '{}' has an invalid stored answer: {error}",
                    self.id
                ))
            })?;

        Submission::restore(SubmissionSnapshot {
            id: SubmissionId::from_uuid(self.id),
            evaluation_id: EvaluationId::from_uuid(self.evaluation_id),
            student_id: UserId::from_uuid(self.student_id),
            answers,
            submitted_at: self.submitted_at,
            status: SubmissionStatus::from_str(self.status.as_str())?,
            total_score: self.total_score,
            feedback: self.feedback,
            graded_by: self.graded_by.map(UserId::from_uuid),
            graded_at: self.graded_at,
            revision: self.revision,
        })
    }
}

fn answer_documents(submission: &Submission) -> Json<Vec<AnswerDocument>> {
    Json(submission.answers().iter().map(AnswerDocument::from).collect())
}

#[async_trait]
impl SubmissionRepository for PostgresSubmissionRepository {
    async fn create_submission(&self, submission: Submission) -> AppResult<Submission> {
        let query = format!(
            r#"
            INSERT INTO submissions ({SUBMISSION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {SUBMISSION_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, SubmissionRow>(query.as_str())
            .bind(submission.id().as_uuid())
            .bind(submission.evaluation_id().as_uuid())
            .bind(submission.student_id().as_uuid())
            .bind(answer_documents(&submission))
            .bind(submission.submitted_at())
            .bind(submission.status().as_str())
            .bind(submission.total_score())
            .bind(submission.feedback())
            .bind(submission.graded_by().map(|user_id| user_id.as_uuid()))
            .bind(submission.graded_at())
            .bind(submission.revision())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23505")
                {
                    warn!(
                        evaluation_id = %submission.evaluation_id(),
                        student_id = %submission.student_id(),
                        "submission uniqueness constraint rejected insert"
                    );
                    return AppError::Conflict(format!(
                        "student '{}' already submitted evaluation '{}'",
                        submission.student_id(),
                        submission.evaluation_id()
                    ));
                }

                AppError::Internal(format!(
                    "failed to create submission '{}': {error}",
                    submission.id()
                ))
            })?;

        row.into_submission()
    }

    async fn find_submission(&self, submission_id: SubmissionId) -> AppResult<Option<Submission>> {
        let query = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1");

        sqlx::query_as::<_, SubmissionRow>(query.as_str())
            .bind(submission_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to find submission '{submission_id}': {error}"
                ))
            })?
            .map(SubmissionRow::into_submission)
            .transpose()
    }

    async fn find_student_submission(
        &self,
        evaluation_id: EvaluationId,
        student_id: UserId,
    ) -> AppResult<Option<Submission>> {
        let query = format!(
            r#"
            SELECT {SUBMISSION_COLUMNS}
            FROM submissions
            WHERE evaluation_id = $1 AND student_id = $2
            "#
        );

        sqlx::query_as::<_, SubmissionRow>(query.as_str())
            .bind(evaluation_id.as_uuid())
            .bind(student_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to find submission of student '{student_id}' for evaluation '{evaluation_id}': {error}"
                ))
            })?
            .map(SubmissionRow::into_submission)
            .transpose()
    }

    async fn update_submission(
        &self,
        expected_revision: i64,
        submission: Submission,
    ) -> AppResult<ConditionalWrite<Submission>> {
        let query = format!(
            r#"
            UPDATE submissions
            SET answers = $3,
                status = $4,
                total_score = $5,
                feedback = $6,
                graded_by = $7,
                graded_at = $8,
                revision = revision + 1
            WHERE id = $1 AND revision = $2
            RETURNING {SUBMISSION_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, SubmissionRow>(query.as_str())
            .bind(submission.id().as_uuid())
            .bind(expected_revision)
            .bind(answer_documents(&submission))
            .bind(submission.status().as_str())
            .bind(submission.total_score())
            .bind(submission.feedback())
            .bind(submission.graded_by().map(|user_id| user_id.as_uuid()))
            .bind(submission.graded_at())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to update submission '{}': {error}",
                    submission.id()
                ))
            })?;

        if let Some(row) = row {
            return row.into_submission().map(ConditionalWrite::Committed);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM submissions WHERE id = $1)",
        )
        .bind(submission.id().as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to check submission '{}': {error}",
                submission.id()
            ))
        })?;

        if !exists {
            return Err(AppError::NotFound(format!(
                "submission '{}' does not exist",
                submission.id()
            )));
        }

        debug!(
            submission_id = %submission.id(),
            expected_revision,
            "submission update lost revision check"
        );
        Ok(ConditionalWrite::StaleRevision)
    }

    async fn list_evaluation_submissions(
        &self,
        evaluation_id: EvaluationId,
    ) -> AppResult<Vec<Submission>> {
        let query = format!(
            r#"
            SELECT {SUBMISSION_COLUMNS}
            FROM submissions
            WHERE evaluation_id = $1
            ORDER BY submitted_at, id
            "#
        );

        let rows = sqlx::query_as::<_, SubmissionRow>(query.as_str())
            .bind(evaluation_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to list submissions for evaluation '{evaluation_id}': {error}"
                ))
            })?;

        rows.into_iter().map(SubmissionRow::into_submission).collect()
    }
}
