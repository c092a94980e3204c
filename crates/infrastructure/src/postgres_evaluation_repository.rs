use std::str::FromStr;

use assessa_application::{ConditionalWrite, EvaluationRepository};
use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::{
    CourseId, Evaluation, EvaluationId, EvaluationSnapshot, EvaluationStatus, EvaluationType,
    LifecycleState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;


/// PostgreSQL-backed evaluation repository with revision-conditioned updates.
#[derive(Clone)]
pub struct PostgresEvaluationRepository {
    pool: PgPool,
}

impl PostgresEvaluationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EVALUATION_COLUMNS: &str = r#"
    id,
    course_id,
    instructor_id,
    evaluation_type,
    title,
    description,
    total_marks,
    weight,
    due_at,
    status,
    published_at,
    closed_at,
    is_deleted,
    created_at,
    revision
"#;

#[derive(Debug, FromRow)]
struct EvaluationRow {
    id: Uuid,
    course_id: Uuid,
    instructor_id: Uuid,
    evaluation_type: String,
    title: String,
    description: Option<String>,
    total_marks: i64,
    weight: i16,
    due_at: Option<DateTime<Utc>>,
    status: String,
    published_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    revision: i64,
}

impl TryFrom<EvaluationRow> for Evaluation {
    type Error = AppError;

    fn try_from(row: EvaluationRow) -> Result<Self, Self::Error> {
        let total_marks = u32::try_from(row.total_marks).map_err(|_| {
            AppError::Internal(format!(
                "evaluation '{}' has out-of-range total_marks {}",
                row.id, row.total_marks
            ))
        })?;
        let weight = u8::try_from(row.weight).map_err(|_| {
            AppError::Internal(format!(
                "evaluation '{}' has out-of-range weight {}",
                row.id, row.weight
            ))
        })?;

        Evaluation::restore(EvaluationSnapshot {
            id: EvaluationId::from_uuid(row.id),
            course_id: CourseId::from_uuid(row.course_id),
            instructor_id: UserId::from_uuid(row.instructor_id),
            evaluation_type: EvaluationType::from_str(row.evaluation_type.as_str())?,
            title: row.title,
            description: row.description,
            total_marks,
            weight,
            due_at: row.due_at,
            status: EvaluationStatus::from_str(row.status.as_str())?,
            published_at: row.published_at,
            closed_at: row.closed_at,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            revision: row.revision,
        })
    }
}

#[async_trait]
impl EvaluationRepository for PostgresEvaluationRepository {
    async fn create_evaluation(&self, evaluation: Evaluation) -> AppResult<Evaluation> {
        let query = format!(
            r#"
            INSERT INTO evaluations ({EVALUATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {EVALUATION_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, EvaluationRow>(query.as_str())
            .bind(evaluation.id().as_uuid())
            .bind(evaluation.course_id().as_uuid())
            .bind(evaluation.instructor_id().as_uuid())
            .bind(evaluation.evaluation_type().as_str())
            .bind(evaluation.title().as_str())
            .bind(evaluation.description())
            .bind(i64::from(evaluation.total_marks()))
            .bind(i16::from(evaluation.weight()))
            .bind(evaluation.due_at())
            .bind(evaluation.status().as_str())
            .bind(evaluation.published_at())
            .bind(evaluation.closed_at())
            .bind(evaluation.is_deleted())
            .bind(evaluation.created_at())
            .bind(evaluation.revision())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23505")
                {
                    return AppError::Conflict(format!(
                        "evaluation '{}' already exists",
                        evaluation.id()
                    ));
                }

                AppError::Internal(format!(
                    "failed to create evaluation '{}': {error}",
                    evaluation.id()
                ))
            })?;

        Evaluation::try_from(row)
    }

    async fn find_evaluation(&self, evaluation_id: EvaluationId) -> AppResult<Option<Evaluation>> {
        let query = format!("SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = $1");

        sqlx::query_as::<_, EvaluationRow>(query.as_str())
            .bind(evaluation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to find evaluation '{evaluation_id}': {error}"
                ))
            })?
            .map(Evaluation::try_from)
            .transpose()
    }

    async fn update_evaluation(
        &self,
        expected_revision: i64,
        evaluation: Evaluation,
    ) -> AppResult<ConditionalWrite<Evaluation>> {
        let query = format!(
            r#"
            UPDATE evaluations
            SET course_id = $3,
                instructor_id = $4,
                evaluation_type = $5,
                title = $6,
                description = $7,
                total_marks = $8,
                weight = $9,
                due_at = $10,
                status = $11,
                published_at = $12,
                closed_at = $13,
                is_deleted = $14,
                revision = revision + 1
            WHERE id = $1 AND revision = $2
            RETURNING {EVALUATION_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, EvaluationRow>(query.as_str())
            .bind(evaluation.id().as_uuid())
            .bind(expected_revision)
            .bind(evaluation.course_id().as_uuid())
            .bind(evaluation.instructor_id().as_uuid())
            .bind(evaluation.evaluation_type().as_str())
            .bind(evaluation.title().as_str())
            .bind(evaluation.description())
            .bind(i64::from(evaluation.total_marks()))
            .bind(i16::from(evaluation.weight()))
            .bind(evaluation.due_at())
            .bind(evaluation.status().as_str())
            .bind(evaluation.published_at())
            .bind(evaluation.closed_at())
            .bind(evaluation.is_deleted())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to update evaluation '{}': {error}",
                    evaluation.id()
                ))
            })?;

        if let Some(row) = row {
            return Evaluation::try_from(row).map(ConditionalWrite::Committed);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM evaluations WHERE id = $1)",
        )
        .bind(evaluation.id().as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to check evaluation '{}': {error}",
                evaluation.id()
            ))
        })?;

        if !exists {
            return Err(AppError::NotFound(format!(
                "evaluation '{}' does not exist",
                evaluation.id()
            )));
        }

        debug!(
            evaluation_id = %evaluation.id(),
            expected_revision,
            "evaluation update lost revision check"
        );
        Ok(ConditionalWrite::StaleRevision)
    }

    async fn list_course_evaluations(&self, course_id: CourseId) -> AppResult<Vec<Evaluation>> {
        let query = format!(
            r#"
            SELECT {EVALUATION_COLUMNS}
            FROM evaluations
            WHERE course_id = $1 AND is_deleted = FALSE
            ORDER BY created_at, id
            "#
        );

        let rows = sqlx::query_as::<_, EvaluationRow>(query.as_str())
            .bind(course_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to list evaluations for course '{course_id}': {error}"
                ))
            })?;

        rows.into_iter().map(Evaluation::try_from).collect()
    }

    async fn list_evaluations_due_for_closing(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Evaluation>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = format!(
            r#"
            SELECT {EVALUATION_COLUMNS}
            FROM evaluations
            WHERE status = 'published'
                AND is_deleted = FALSE
                AND due_at <= $1
            ORDER BY due_at, id
            LIMIT $2
            "#
        );

        let rows = sqlx::query_as::<_, EvaluationRow>(query.as_str())
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list due evaluations: {error}"))
            })?;

        rows.into_iter().map(Evaluation::try_from).collect()
    }
}
