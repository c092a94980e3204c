use std::sync::Arc;

use assessa_core::AppError;
use assessa_domain::{
    AuditAction, CourseId, EvaluationInput, EvaluationPatch, EvaluationStatus, EvaluationType,
    RoleName,
};
use chrono::{Duration, Utc};

use crate::{AuthorizationService, MAX_WRITE_ATTEMPTS};
use crate::test_support::{
    FakeAuditRepository, FakeEnrollmentRepository, FakeEvaluationRepository, FakeRoleRepository,
    principal_with,
};

use super::EvaluationService;

struct Harness {
    service: EvaluationService,
    repository: Arc<FakeEvaluationRepository>,
    enrollments: Arc<FakeEnrollmentRepository>,
    audit: Arc<FakeAuditRepository>,
}

fn harness() -> Harness {
    let repository = Arc::new(FakeEvaluationRepository::default());
    let enrollments = Arc::new(FakeEnrollmentRepository::default());
    let audit = Arc::new(FakeAuditRepository::default());
    let authorization_service =
        AuthorizationService::new(Arc::new(FakeRoleRepository), audit.clone());

    Harness {
        service: EvaluationService::new(
            authorization_service,
            repository.clone(),
            enrollments.clone(),
            audit.clone(),
        ),
        repository,
        enrollments,
        audit,
    }
}

fn input(course_id: CourseId) -> EvaluationInput {
    EvaluationInput {
        course_id,
        evaluation_type: EvaluationType::Assignment,
        title: "Ownership essay".to_owned(),
        description: Some("Explain the borrow checker".to_owned()),
        total_marks: 100,
        weight: 20,
        due_at: None,
    }
}

#[tokio::test]
async fn students_cannot_create_evaluations() {
    let harness = harness();
    let student = principal_with(RoleName::Student);

    let result = harness
        .service
        .create_evaluation(&student, input(CourseId::new()))
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn draft_to_closed_scenario() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);

    let created = harness
        .service
        .create_evaluation(&instructor, input(CourseId::new()))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(created.status(), EvaluationStatus::Draft);

    let edited = harness
        .service
        .propose_evaluation_write(
            &instructor,
            created.id(),
            EvaluationPatch {
                total_marks: Some(80),
                ..EvaluationPatch::default()
            },
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(edited.total_marks(), 80);

    let published = harness
        .service
        .publish_evaluation(&instructor, created.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(published.status(), EvaluationStatus::Published);
    assert!(published.published_at().is_some());

    let rejected = harness
        .service
        .propose_evaluation_write(
            &instructor,
            created.id(),
            EvaluationPatch {
                total_marks: Some(90),
                ..EvaluationPatch::default()
            },
        )
        .await;
    assert!(
        matches!(rejected, Err(AppError::ImmutabilityViolation(fields)) if fields == vec!["total_marks".to_owned()])
    );

    let closed = harness
        .service
        .close_evaluation(&instructor, created.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(closed.status(), EvaluationStatus::Closed);
    assert!(closed.closed_at().is_some());
    assert_eq!(closed.total_marks(), 80);

    let actions: Vec<AuditAction> = harness
        .audit
        .events
        .lock()
        .await
        .iter()
        .map(|event| event.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::EvaluationCreated,
            AuditAction::EvaluationUpdated,
            AuditAction::EvaluationPublished,
            AuditAction::EvaluationClosed,
        ]
    );
}

#[tokio::test]
async fn other_instructors_cannot_edit() {
    let harness = harness();
    let owner = principal_with(RoleName::Instructor);
    let stranger = principal_with(RoleName::Instructor);
    let admin = principal_with(RoleName::Admin);

    let created = harness
        .service
        .create_evaluation(&owner, input(CourseId::new()))
        .await
        .unwrap_or_else(|_| unreachable!());

    let patch = EvaluationPatch {
        title: Some("Hijacked".to_owned()),
        ..EvaluationPatch::default()
    };
    let result = harness
        .service
        .propose_evaluation_write(&stranger, created.id(), patch.clone())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let result = harness
        .service
        .propose_evaluation_write(&admin, created.id(), patch)
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn unknown_evaluation_is_not_found() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);

    let result = harness
        .service
        .publish_evaluation(&instructor, assessa_domain::EvaluationId::new())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn backward_transition_is_rejected() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);
    let created = harness
        .service
        .create_evaluation(&instructor, input(CourseId::new()))
        .await
        .unwrap_or_else(|_| unreachable!());
    harness
        .service
        .publish_evaluation(&instructor, created.id())
        .await
        .unwrap_or_else(|_| unreachable!());

    let result = harness
        .service
        .propose_evaluation_write(
            &instructor,
            created.id(),
            EvaluationPatch::status(EvaluationStatus::Draft),
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn content_edit_racing_publish_is_rechecked() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);
    let created = harness
        .service
        .create_evaluation(&instructor, input(CourseId::new()))
        .await
        .unwrap_or_else(|_| unreachable!());

    let published_elsewhere = created
        .apply_patch(&EvaluationPatch::status(EvaluationStatus::Published), Utc::now())
        .unwrap_or_else(|_| unreachable!());
    harness
        .repository
        .competing_writes
        .lock()
        .await
        .push(published_elsewhere);

    let result = harness
        .service
        .propose_evaluation_write(
            &instructor,
            created.id(),
            EvaluationPatch {
                title: Some("Sneaky rename".to_owned()),
                ..EvaluationPatch::default()
            },
        )
        .await;
    assert!(
        matches!(result, Err(AppError::ImmutabilityViolation(fields)) if fields == vec!["title".to_owned()])
    );

    let stored = harness
        .repository
        .evaluations
        .lock()
        .await
        .get(&created.id())
        .cloned()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(stored.status(), EvaluationStatus::Published);
    assert_eq!(stored.title().as_str(), "Ownership essay");
}

#[tokio::test]
async fn edit_gives_up_when_revisions_keep_moving() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);
    let created = harness
        .service
        .create_evaluation(&instructor, input(CourseId::new()))
        .await
        .unwrap_or_else(|_| unreachable!());

    harness
        .repository
        .competing_writes
        .lock()
        .await
        .extend(std::iter::repeat_n(created.clone(), MAX_WRITE_ATTEMPTS));

    let result = harness
        .service
        .propose_evaluation_write(
            &instructor,
            created.id(),
            EvaluationPatch {
                title: Some("Borrowing essay".to_owned()),
                ..EvaluationPatch::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let stored = harness
        .repository
        .evaluations
        .lock()
        .await
        .get(&created.id())
        .cloned()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(stored.title().as_str(), "Ownership essay");
    assert_eq!(stored.revision(), created.revision() + 3);
}

#[tokio::test]
async fn deleted_drafts_disappear_and_published_cannot_be_deleted() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);
    let course_id = CourseId::new();

    let draft = harness
        .service
        .create_evaluation(&instructor, input(course_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    let deleted = harness.service.delete_evaluation(&instructor, draft.id()).await;
    assert!(matches!(&deleted, Ok(evaluation) if evaluation.is_deleted()));
    assert!(matches!(
        harness.service.get_evaluation(&instructor, draft.id()).await,
        Err(AppError::NotFound(_))
    ));

    let live = harness
        .service
        .create_evaluation(&instructor, input(course_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    harness
        .service
        .publish_evaluation(&instructor, live.id())
        .await
        .unwrap_or_else(|_| unreachable!());
    let result = harness.service.delete_evaluation(&instructor, live.id()).await;
    assert!(matches!(result, Err(AppError::ImmutabilityViolation(_))));
}

#[tokio::test]
async fn students_see_only_published_evaluations_of_enrolled_courses() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);
    let student = principal_with(RoleName::Student);
    let course_id = CourseId::new();

    let hidden = harness
        .service
        .create_evaluation(&instructor, input(course_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    let visible = harness
        .service
        .create_evaluation(&instructor, input(course_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    harness
        .service
        .publish_evaluation(&instructor, visible.id())
        .await
        .unwrap_or_else(|_| unreachable!());

    let listed = harness
        .service
        .list_course_evaluations(&student, course_id)
        .await
        .unwrap_or_default();
    assert!(listed.is_empty());

    harness
        .enrollments
        .enrollments
        .lock()
        .await
        .insert((course_id, student.user_id()));

    let listed = harness
        .service
        .list_course_evaluations(&student, course_id)
        .await
        .unwrap_or_default();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), visible.id());

    assert!(matches!(
        harness.service.get_evaluation(&student, hidden.id()).await,
        Err(AppError::NotFound(_))
    ));
    assert!(harness.service.get_evaluation(&student, visible.id()).await.is_ok());
}

#[tokio::test]
async fn close_due_evaluations_closes_only_expired() {
    let harness = harness();
    let instructor = principal_with(RoleName::Instructor);
    let closer = principal_with(RoleName::Admin);
    let now = Utc::now();

    let mut expired_input = input(CourseId::new());
    expired_input.due_at = Some(now - Duration::minutes(5));
    let mut open_input = input(CourseId::new());
    open_input.due_at = Some(now + Duration::days(1));

    let expired = harness
        .service
        .create_evaluation(&instructor, expired_input)
        .await
        .unwrap_or_else(|_| unreachable!());
    let open = harness
        .service
        .create_evaluation(&instructor, open_input)
        .await
        .unwrap_or_else(|_| unreachable!());
    for id in [expired.id(), open.id()] {
        harness
            .service
            .publish_evaluation(&instructor, id)
            .await
            .unwrap_or_else(|_| unreachable!());
    }

    let closed = harness
        .service
        .close_due_evaluations(&closer, now, 10)
        .await
        .unwrap_or_default();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].id(), expired.id());
    assert_eq!(closed[0].status(), EvaluationStatus::Closed);
}
