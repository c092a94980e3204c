use assessa_core::{AppResult, UserId};
use assessa_domain::{CourseId, Role, RoleName};
use async_trait::async_trait;

/// Repository port for role documents and subject memberships.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists every role attached to a subject, including disabled ones.
    async fn list_roles_for_subject(&self, subject: UserId) -> AppResult<Vec<Role>>;

    /// Inserts or replaces a role document keyed by its name.
    async fn save_role(&self, role: Role) -> AppResult<()>;

    /// Attaches an existing role to a subject.
    async fn assign_role(&self, subject: UserId, role_name: RoleName) -> AppResult<()>;
}

/// Read port for course membership maintained by the course service.
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Returns whether the user is enrolled in the course.
    async fn is_enrolled(&self, course_id: CourseId, user_id: UserId) -> AppResult<bool>;
}
