//! Services wired to the in-memory adapters.

use std::sync::Arc;

use assessa_application::{
    AuthorizationService, EvaluationService, GradeInput, RoleRepository, SubmissionService,
};
use assessa_core::{AppError, UserId, UserIdentity};
use assessa_domain::{
    Answer, AuditAction, CourseId, EvaluationInput, EvaluationPatch, EvaluationStatus,
    EvaluationType, Principal, Role, RoleName, SubmissionStatus,
};
use assessa_infrastructure::InMemoryAssessmentRepository;

struct Platform {
    store: Arc<InMemoryAssessmentRepository>,
    authorization: AuthorizationService,
    evaluations: EvaluationService,
    submissions: SubmissionService,
}

async fn platform() -> Platform {
    let store = Arc::new(InMemoryAssessmentRepository::new());
    for role in Role::default_catalog().unwrap_or_default() {
        assert!(store.save_role(role).await.is_ok());
    }

    let authorization = AuthorizationService::new(store.clone(), store.clone());
    let evaluations = EvaluationService::new(
        authorization.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    );
    let submissions = SubmissionService::new(
        authorization.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    );

    Platform {
        store,
        authorization,
        evaluations,
        submissions,
    }
}

impl Platform {
    async fn principal(&self, name: &str, role_name: RoleName) -> Principal {
        let user_id = UserId::new();
        assert!(self.store.assign_role(user_id, role_name).await.is_ok());

        self.authorization
            .resolve_principal(UserIdentity::new(user_id, name, None))
            .await
            .unwrap_or_else(|_| unreachable!())
    }
}

fn essay(course_id: CourseId) -> EvaluationInput {
    EvaluationInput {
        course_id,
        evaluation_type: EvaluationType::Assignment,
        title: "Async runtimes".to_owned(),
        description: None,
        total_marks: 100,
        weight: 25,
        due_at: None,
    }
}

#[tokio::test]
async fn evaluation_and_submission_lifecycle() {
    let platform = platform().await;
    let instructor = platform.principal("Barbara", RoleName::Instructor).await;
    let student = platform.principal("Edsger", RoleName::Student).await;
    let course_id = CourseId::new();
    platform.store.enroll(course_id, student.user_id()).await;

    let draft = platform
        .evaluations
        .create_evaluation(&instructor, essay(course_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    let edited = platform
        .evaluations
        .propose_evaluation_write(
            &instructor,
            draft.id(),
            EvaluationPatch {
                total_marks: Some(80),
                ..EvaluationPatch::default()
            },
        )
        .await;
    assert!(matches!(&edited, Ok(evaluation) if evaluation.total_marks() == 80));

    let published = platform
        .evaluations
        .publish_evaluation(&instructor, draft.id())
        .await;
    assert!(matches!(&published, Ok(evaluation) if evaluation.published_at().is_some()));

    let frozen = platform
        .evaluations
        .propose_evaluation_write(
            &instructor,
            draft.id(),
            EvaluationPatch {
                total_marks: Some(90),
                ..EvaluationPatch::default()
            },
        )
        .await;
    assert!(
        matches!(frozen, Err(AppError::ImmutabilityViolation(fields)) if fields == vec!["total_marks".to_owned()])
    );

    let submitted = platform
        .submissions
        .submit(
            &student,
            draft.id(),
            vec![Answer::new("q1", "work stealing").unwrap_or_else(|_| unreachable!())],
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    let graded = platform
        .submissions
        .grade_submission(
            &instructor,
            submitted.id(),
            GradeInput {
                total_score: 72.0,
                feedback: Some("Good coverage of schedulers".to_owned()),
            },
        )
        .await;
    assert!(matches!(&graded, Ok(submission) if submission.status() == SubmissionStatus::Graded));

    let closed = platform
        .evaluations
        .close_evaluation(&instructor, draft.id())
        .await;
    assert!(matches!(&closed, Ok(evaluation) if evaluation.status() == EvaluationStatus::Closed));

    let actions: Vec<AuditAction> = platform
        .store
        .audit_events()
        .await
        .into_iter()
        .map(|event| event.action)
        .collect();
    assert!(actions.contains(&AuditAction::EvaluationPublished));
    assert!(actions.contains(&AuditAction::SubmissionGraded));
    assert!(actions.contains(&AuditAction::EvaluationClosed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_submissions_produce_one_conflict() {
    let platform = platform().await;
    let instructor = platform.principal("Barbara", RoleName::Instructor).await;
    let student = platform.principal("Edsger", RoleName::Student).await;
    let course_id = CourseId::new();
    platform.store.enroll(course_id, student.user_id()).await;

    let evaluation = platform
        .evaluations
        .create_evaluation(&instructor, essay(course_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(
        platform
            .evaluations
            .publish_evaluation(&instructor, evaluation.id())
            .await
            .is_ok()
    );

    let answers = vec![Answer::new("q1", "tokio").unwrap_or_else(|_| unreachable!())];
    let evaluation_id = evaluation.id();
    let left = {
        let service = platform.submissions.clone();
        let student = student.clone();
        let answers = answers.clone();
        tokio::spawn(async move { service.submit(&student, evaluation_id, answers).await })
    };
    let right = {
        let service = platform.submissions.clone();
        let student = student.clone();
        tokio::spawn(async move { service.submit(&student, evaluation_id, answers).await })
    };

    let outcomes = [left.await, right.await];
    let committed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(Ok(_))))
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(Err(AppError::Conflict(_)))))
        .count();

    assert_eq!(committed, 1);
    assert_eq!(conflicts, 1);
}

#[tokio::test]
async fn disabled_admin_role_grants_nothing() {
    let platform = platform().await;
    let disabled_admin = Role::default_catalog()
        .unwrap_or_default()
        .into_iter()
        .find(|role| role.name() == RoleName::Admin)
        .unwrap_or_else(|| unreachable!())
        .with_active(false);
    assert!(platform.store.save_role(disabled_admin).await.is_ok());

    let operator = platform.principal("Ada", RoleName::Admin).await;
    let result = platform
        .evaluations
        .create_evaluation(&operator, essay(CourseId::new()))
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}
