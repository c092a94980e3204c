use assessa_application::{ConditionalWrite, EvaluationRepository, SubmissionRepository};
use assessa_core::{AppError, UserId};
use assessa_domain::{
    Answer, CourseId, Evaluation, EvaluationInput, EvaluationType, Submission, SubmissionPatch,
    SubmissionStatus,
};
use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use crate::PostgresEvaluationRepository;

use super::PostgresSubmissionRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres submission tests: {error}");
    }

    Some(pool)
}

async fn stored_evaluation(pool: &PgPool) -> Evaluation {
    let evaluation = Evaluation::new(
        EvaluationInput {
            course_id: CourseId::new(),
            evaluation_type: EvaluationType::Assignment,
            title: "Error handling".to_owned(),
            description: None,
            total_marks: 10,
            weight: 10,
            due_at: None,
        },
        UserId::new(),
        Utc::now(),
    )
    .unwrap_or_else(|_| unreachable!());

    PostgresEvaluationRepository::new(pool.clone())
        .create_evaluation(evaluation)
        .await
        .unwrap_or_else(|_| unreachable!())
}

fn submission(evaluation: &Evaluation, student_id: UserId) -> Submission {
    Submission::new(
        evaluation.id(),
        student_id,
        vec![
            Answer::new("q1", "use the question mark operator").unwrap_or_else(|_| unreachable!()),
            Answer::new("q2", "thiserror for libraries").unwrap_or_else(|_| unreachable!()),
        ],
        Utc::now(),
    )
    .unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn answers_round_trip_through_jsonb() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let evaluation = stored_evaluation(&pool).await;
    let repository = PostgresSubmissionRepository::new(pool);
    let student_id = UserId::new();
    let created = repository
        .create_submission(submission(&evaluation, student_id))
        .await
        .unwrap_or_else(|_| unreachable!());

    let found = repository
        .find_student_submission(evaluation.id(), student_id)
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(found.id(), created.id());
    assert_eq!(found.answers().len(), 2);
    assert_eq!(found.answers()[1].question_id(), "q2");
    assert_eq!(found.status(), SubmissionStatus::Submitted);
}

#[tokio::test]
async fn grading_update_is_revision_checked() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let evaluation = stored_evaluation(&pool).await;
    let repository = PostgresSubmissionRepository::new(pool);
    let created = repository
        .create_submission(submission(&evaluation, UserId::new()))
        .await
        .unwrap_or_else(|_| unreachable!());

    let grader = UserId::new();
    let graded = created
        .apply_patch(
            &SubmissionPatch {
                total_score: Some(7.5),
                status: Some(SubmissionStatus::Graded),
                ..SubmissionPatch::default()
            },
            grader,
            Utc::now(),
        )
        .unwrap_or_else(|_| unreachable!());

    let committed = repository.update_submission(0, graded.clone()).await;
    assert!(
        matches!(&committed, Ok(ConditionalWrite::Committed(saved)) if saved.graded_by() == Some(grader) && saved.total_score() == Some(7.5))
    );

    let stale = repository.update_submission(0, graded).await;
    assert!(matches!(stale, Ok(ConditionalWrite::StaleRevision)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_submissions_admit_exactly_one() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let evaluation = stored_evaluation(&pool).await;
    let repository = PostgresSubmissionRepository::new(pool);
    let student_id = UserId::new();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let repository = repository.clone();
        let candidate = submission(&evaluation, student_id);
        handles.push(tokio::spawn(async move {
            repository.create_submission(candidate).await
        }));
    }

    let mut committed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => committed += 1,
            Ok(Err(AppError::Conflict(_))) => conflicts += 1,
            _ => unreachable!(),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(conflicts, 5);
}
