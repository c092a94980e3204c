use std::sync::Arc;

use assessa_core::{AppError, AppResult};
use assessa_domain::{
    Action, AuditAction, ChangedFields, CourseId, Evaluation, EvaluationId, EvaluationInput,
    EvaluationPatch, EvaluationStatus, Principal, RESOURCE_EVALUATIONS, RequiredPermission,
    guard_update,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    AuditEvent, AuditRepository, AuthorizationService, ConditionalWrite, EnrollmentRepository,
    EvaluationRepository,
};

#[cfg(test)]
mod tests;

/// Number of snapshot reloads before a contended write gives up.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Application service owning the evaluation lifecycle.
#[derive(Clone)]
pub struct EvaluationService {
    authorization_service: AuthorizationService,
    repository: Arc<dyn EvaluationRepository>,
    enrollment_repository: Arc<dyn EnrollmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl EvaluationService {
    /// Creates a new evaluation service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        repository: Arc<dyn EvaluationRepository>,
        enrollment_repository: Arc<dyn EnrollmentRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            authorization_service,
            repository,
            enrollment_repository,
            audit_repository,
        }
    }

    /// Creates a draft evaluation owned by the acting instructor.
    pub async fn create_evaluation(
        &self,
        actor: &Principal,
        input: EvaluationInput,
    ) -> AppResult<Evaluation> {
        self.authorization_service
            .require_permission(actor, RESOURCE_EVALUATIONS, Action::Create)
            .await?;

        let evaluation = Evaluation::new(input, actor.user_id(), Utc::now())?;
        let evaluation = self.repository.create_evaluation(evaluation).await?;

        self.audit_repository
            .append_event(AuditEvent {
                subject: actor.user_id(),
                action: AuditAction::EvaluationCreated,
                resource_type: "evaluation".to_owned(),
                resource_id: evaluation.id().to_string(),
                detail: Some(format!(
                    "created {} '{}' in course '{}'",
                    evaluation.evaluation_type().as_str(),
                    evaluation.title().as_str(),
                    evaluation.course_id()
                )),
            })
            .await?;

        info!(
            evaluation_id = %evaluation.id(),
            instructor_id = %evaluation.instructor_id(),
            "evaluation created"
        );

        Ok(evaluation)
    }

    /// Returns one evaluation if the actor may see it.
    ///
    /// Owners and override principals see drafts; enrolled students see
    /// published and closed evaluations. Everything else reads as not found.
    pub async fn get_evaluation(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
    ) -> AppResult<Evaluation> {
        self.authorization_service
            .require_permission(actor, RESOURCE_EVALUATIONS, Action::Read)
            .await?;

        let evaluation = self.load_live(evaluation_id).await?;
        if is_owner(actor, &evaluation) {
            return Ok(evaluation);
        }

        let enrolled = self
            .enrollment_repository
            .is_enrolled(evaluation.course_id(), actor.user_id())
            .await?;
        if enrolled && evaluation.is_visible_to_students() {
            return Ok(evaluation);
        }

        Err(not_found(evaluation_id))
    }

    /// Lists the course evaluations visible to the actor.
    pub async fn list_course_evaluations(
        &self,
        actor: &Principal,
        course_id: CourseId,
    ) -> AppResult<Vec<Evaluation>> {
        self.authorization_service
            .require_permission(actor, RESOURCE_EVALUATIONS, Action::Read)
            .await?;

        let enrolled = self
            .enrollment_repository
            .is_enrolled(course_id, actor.user_id())
            .await?;
        let evaluations = self.repository.list_course_evaluations(course_id).await?;

        Ok(evaluations
            .into_iter()
            .filter(|evaluation| {
                is_owner(actor, evaluation) || (enrolled && evaluation.is_visible_to_students())
            })
            .collect())
    }

    /// Applies a proposed write to a persisted evaluation.
    ///
    /// The write is diffed against the latest snapshot and checked by the
    /// lifecycle guard before a revision-conditioned commit. A lost race
    /// reloads the snapshot and re-checks, so an edit that raced a publish is
    /// rejected instead of overwriting it.
    pub async fn propose_evaluation_write(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
        patch: EvaluationPatch,
    ) -> AppResult<Evaluation> {
        let mut required = vec![RequiredPermission::new(
            RESOURCE_EVALUATIONS,
            Action::Update,
        )];
        if patch.is_deleted == Some(true) {
            required.push(RequiredPermission::new(RESOURCE_EVALUATIONS, Action::Delete));
        }
        self.authorization_service
            .require_permissions(actor, &required)
            .await?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let before = self.load_live(evaluation_id).await?;
            ensure_owner(actor, &before)?;

            let after = before.apply_patch(&patch, Utc::now())?;
            let changed = guard_update(&before, &after).inspect_err(|error| {
                warn!(
                    evaluation_id = %evaluation_id,
                    subject = %actor.user_id(),
                    status = ?before.status(),
                    error = %error,
                    "evaluation write rejected"
                );
            })?;

            if changed.is_empty() {
                return Ok(before);
            }

            match self
                .repository
                .update_evaluation(before.revision(), after)
                .await?
            {
                ConditionalWrite::Committed(saved) => {
                    self.append_write_event(actor, &before, &saved, &changed)
                        .await?;
                    info!(
                        evaluation_id = %evaluation_id,
                        status = ?saved.status(),
                        revision = saved.revision(),
                        "evaluation write committed"
                    );
                    return Ok(saved);
                }
                ConditionalWrite::StaleRevision => {
                    debug!(
                        evaluation_id = %evaluation_id,
                        attempt,
                        "evaluation changed concurrently, reloading snapshot"
                    );
                }
            }
        }

        Err(AppError::Conflict(format!(
            "evaluation '{evaluation_id}' kept changing concurrently; write abandoned after {MAX_WRITE_ATTEMPTS} attempts"
        )))
    }

    /// Moves a draft evaluation to published.
    pub async fn publish_evaluation(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
    ) -> AppResult<Evaluation> {
        self.propose_evaluation_write(
            actor,
            evaluation_id,
            EvaluationPatch::status(EvaluationStatus::Published),
        )
        .await
    }

    /// Moves a published evaluation to closed.
    pub async fn close_evaluation(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
    ) -> AppResult<Evaluation> {
        self.propose_evaluation_write(
            actor,
            evaluation_id,
            EvaluationPatch::status(EvaluationStatus::Closed),
        )
        .await
    }

    /// Soft-deletes an evaluation. Only drafts can be deleted.
    pub async fn delete_evaluation(
        &self,
        actor: &Principal,
        evaluation_id: EvaluationId,
    ) -> AppResult<Evaluation> {
        self.propose_evaluation_write(
            actor,
            evaluation_id,
            EvaluationPatch {
                is_deleted: Some(true),
                ..EvaluationPatch::default()
            },
        )
        .await
    }

    /// Closes published evaluations whose deadline has passed.
    ///
    /// Per-evaluation failures are logged and skipped. Returns the evaluations
    /// closed by this pass.
    pub async fn close_due_evaluations(
        &self,
        actor: &Principal,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Evaluation>> {
        let due = self
            .repository
            .list_evaluations_due_for_closing(now, limit)
            .await?;

        let mut closed = Vec::with_capacity(due.len());
        for evaluation in due {
            match self.close_evaluation(actor, evaluation.id()).await {
                Ok(saved) => closed.push(saved),
                Err(error) => {
                    warn!(
                        evaluation_id = %evaluation.id(),
                        error = %error,
                        "failed to close due evaluation"
                    );
                }
            }
        }

        Ok(closed)
    }

    async fn load_live(&self, evaluation_id: EvaluationId) -> AppResult<Evaluation> {
        self.repository
            .find_evaluation(evaluation_id)
            .await?
            .filter(|evaluation| !evaluation.is_deleted())
            .ok_or_else(|| not_found(evaluation_id))
    }

    async fn append_write_event(
        &self,
        actor: &Principal,
        before: &Evaluation,
        saved: &Evaluation,
        changed: &ChangedFields,
    ) -> AppResult<()> {
        let action = if saved.is_deleted() {
            AuditAction::EvaluationDeleted
        } else if before.status() != saved.status() {
            match saved.status() {
                EvaluationStatus::Published => AuditAction::EvaluationPublished,
                EvaluationStatus::Closed => AuditAction::EvaluationClosed,
                EvaluationStatus::Draft => AuditAction::EvaluationUpdated,
            }
        } else {
            AuditAction::EvaluationUpdated
        };

        self.audit_repository
            .append_event(AuditEvent {
                subject: actor.user_id(),
                action,
                resource_type: "evaluation".to_owned(),
                resource_id: saved.id().to_string(),
                detail: Some(format!(
                    "changed fields: {}",
                    changed.iter().collect::<Vec<_>>().join(", ")
                )),
            })
            .await
    }
}

fn is_owner(actor: &Principal, evaluation: &Evaluation) -> bool {
    evaluation.instructor_id() == actor.user_id() || actor.has_override()
}

fn ensure_owner(actor: &Principal, evaluation: &Evaluation) -> AppResult<()> {
    if is_owner(actor, evaluation) {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "subject '{}' does not own evaluation '{}'",
        actor.user_id(),
        evaluation.id()
    )))
}

fn not_found(evaluation_id: EvaluationId) -> AppError {
    AppError::NotFound(format!("evaluation '{evaluation_id}' does not exist"))
}

