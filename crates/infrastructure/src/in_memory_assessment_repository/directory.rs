use assessa_application::{AuditEvent, AuditRepository, EnrollmentRepository, RoleRepository};
use assessa_core::{AppError, AppResult, UserId};
use assessa_domain::{CourseId, Role, RoleName};
use async_trait::async_trait;

use super::InMemoryAssessmentRepository;

#[async_trait]
impl RoleRepository for InMemoryAssessmentRepository {
    async fn list_roles_for_subject(&self, subject: UserId) -> AppResult<Vec<Role>> {
        let role_names = self
            .subject_roles
            .read()
            .await
            .get(&subject)
            .cloned()
            .unwrap_or_default();
        let roles = self.roles.read().await;

        Ok(role_names
            .iter()
            .filter_map(|role_name| roles.get(role_name).cloned())
            .collect())
    }

    async fn save_role(&self, role: Role) -> AppResult<()> {
        self.roles.write().await.insert(role.name(), role);
        Ok(())
    }

    async fn assign_role(&self, subject: UserId, role_name: RoleName) -> AppResult<()> {
        if !self.roles.read().await.contains_key(&role_name) {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                role_name.as_str()
            )));
        }

        let mut subject_roles = self.subject_roles.write().await;
        let assigned = subject_roles.entry(subject).or_default();
        if !assigned.contains(&role_name) {
            assigned.push(role_name);
        }

        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryAssessmentRepository {
    async fn is_enrolled(&self, course_id: CourseId, user_id: UserId) -> AppResult<bool> {
        Ok(self
            .enrollments
            .read()
            .await
            .contains(&(course_id, user_id)))
    }
}

#[async_trait]
impl AuditRepository for InMemoryAssessmentRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.audit_events.write().await.push(event);
        Ok(())
    }
}
