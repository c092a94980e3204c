use assessa_application::EnrollmentRepository;
use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::CourseId;
use async_trait::async_trait;
use sqlx::PgPool;

/// PostgreSQL-backed read view over course enrollments.
#[derive(Clone)]
pub struct PostgresEnrollmentRepository {
    pool: PgPool,
}

impl PostgresEnrollmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentRepository for PostgresEnrollmentRepository {
    async fn is_enrolled(&self, course_id: CourseId, user_id: UserId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM course_enrollments
                WHERE course_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(course_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to check enrollment of '{user_id}' in course '{course_id}': {error}"
            ))
        })
    }
}
