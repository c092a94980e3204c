use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use assessa_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Resource name that, combined with [`Action::Manage`], grants every pair system-wide.
pub const ALL_RESOURCES: &str = "all";

/// Resource name guarding course data.
pub const RESOURCE_COURSES: &str = "courses";

/// Resource name guarding evaluation definitions.
pub const RESOURCE_EVALUATIONS: &str = "evaluations";

/// Resource name guarding student submissions.
pub const RESOURCE_SUBMISSIONS: &str = "submissions";

/// Actions a permission entry can allow on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create new documents.
    Create,
    /// Read documents.
    Read,
    /// Modify existing documents.
    Update,
    /// Remove documents.
    Delete,
    /// Administrative control over the resource.
    Manage,
}

impl Action {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Manage => "manage",
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Action] = &[
            Action::Create,
            Action::Read,
            Action::Update,
            Action::Delete,
            Action::Manage,
        ];

        ALL
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "manage" => Ok(Self::Manage),
            _ => Err(AppError::Validation(format!("unknown action '{value}'"))),
        }
    }
}

/// Closed set of role names known to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    /// Platform administrator.
    Admin,
    /// Course instructor and grader.
    Instructor,
    /// Enrolled learner.
    Student,
}

impl RoleName {
    /// Returns a stable storage value for this role name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Instructor => "instructor",
            Self::Student => "student",
        }
    }
}

impl FromStr for RoleName {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "instructor" => Ok(Self::Instructor),
            "student" => Ok(Self::Student),
            _ => Err(AppError::Validation(format!("unknown role name '{value}'"))),
        }
    }
}

/// Allowed actions on one named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    resource: NonEmptyString,
    actions: BTreeSet<Action>,
}

impl PermissionSet {
    /// Creates a permission entry; at least one action is required.
    pub fn new(
        resource: impl Into<String>,
        actions: impl IntoIterator<Item = Action>,
    ) -> AppResult<Self> {
        let resource = NonEmptyString::new(resource)?;
        let actions: BTreeSet<Action> = actions.into_iter().collect();

        if actions.is_empty() {
            return Err(AppError::Validation(format!(
                "permission entry for resource '{}' must allow at least one action",
                resource.as_str()
            )));
        }

        Ok(Self { resource, actions })
    }

    /// Returns the resource name this entry applies to.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the allowed actions.
    #[must_use]
    pub fn actions(&self) -> &BTreeSet<Action> {
        &self.actions
    }

    /// Returns whether this entry allows `action` on `resource`.
    #[must_use]
    pub fn allows(&self, resource: &str, action: Action) -> bool {
        self.resource.as_str() == resource && self.actions.contains(&action)
    }

    /// Returns whether this entry is the system-wide `all:manage` grant.
    #[must_use]
    pub fn is_wildcard_manage(&self) -> bool {
        self.resource.as_str() == ALL_RESOURCES && self.actions.contains(&Action::Manage)
    }
}

/// One (resource, action) pair a caller must hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredPermission {
    resource: String,
    action: Action,
}

impl RequiredPermission {
    /// Creates a required pair.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }

    /// Returns the resource name.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }
}

impl Display for RequiredPermission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource, self.action.as_str())
    }
}

/// Named, leveled bundle of permission entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    name: RoleName,
    level: u8,
    description: Option<String>,
    permissions: Vec<PermissionSet>,
    is_active: bool,
}

impl Role {
    /// Lowest accepted role level.
    pub const MIN_LEVEL: u8 = 1;

    /// Highest accepted role level.
    pub const MAX_LEVEL: u8 = 100;

    /// Creates an active role with validated level.
    pub fn new(name: RoleName, level: u8, permissions: Vec<PermissionSet>) -> AppResult<Self> {
        if !(Self::MIN_LEVEL..=Self::MAX_LEVEL).contains(&level) {
            return Err(AppError::Validation(format!(
                "role level must be between {} and {}, got {level}",
                Self::MIN_LEVEL,
                Self::MAX_LEVEL
            )));
        }

        Ok(Self {
            name,
            level,
            description: None,
            permissions,
            is_active: true,
        })
    }

    /// Attaches a display description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the soft-disable flag.
    #[must_use]
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> RoleName {
        self.name
    }

    /// Returns the display ranking hint.
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns permission entries in declaration order.
    #[must_use]
    pub fn permissions(&self) -> &[PermissionSet] {
        &self.permissions
    }

    /// Returns whether the role takes part in authorization decisions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns whether this is the hardcoded admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.name == RoleName::Admin
    }

    /// Returns whether any entry is the `all:manage` grant.
    #[must_use]
    pub fn has_wildcard_manage(&self) -> bool {
        self.permissions.iter().any(PermissionSet::is_wildcard_manage)
    }

    /// Returns whether one of this role's entries grants the pair.
    #[must_use]
    pub fn grants(&self, required: &RequiredPermission) -> bool {
        self.permissions
            .iter()
            .any(|entry| entry.allows(required.resource(), required.action()))
    }

    /// Returns the role catalog seeded at bootstrap.
    pub fn default_catalog() -> AppResult<Vec<Self>> {
        Ok(vec![
            Self::new(
                RoleName::Admin,
                100,
                vec![PermissionSet::new(ALL_RESOURCES, [Action::Manage])?],
            )?
            .with_description("Platform administrator"),
            Self::new(
                RoleName::Instructor,
                50,
                vec![
                    PermissionSet::new(RESOURCE_COURSES, [Action::Read])?,
                    PermissionSet::new(
                        RESOURCE_EVALUATIONS,
                        [Action::Create, Action::Read, Action::Update, Action::Delete],
                    )?,
                    PermissionSet::new(RESOURCE_SUBMISSIONS, [Action::Read, Action::Update])?,
                ],
            )?
            .with_description("Creates evaluations and grades submissions"),
            Self::new(
                RoleName::Student,
                10,
                vec![
                    PermissionSet::new(RESOURCE_COURSES, [Action::Read])?,
                    PermissionSet::new(RESOURCE_EVALUATIONS, [Action::Read])?,
                    PermissionSet::new(RESOURCE_SUBMISSIONS, [Action::Create, Action::Read])?,
                ],
            )?
            .with_description("Takes evaluations"),
        ])
    }
}

/// Stable audit actions emitted by application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a draft evaluation is created.
    EvaluationCreated,
    /// Emitted when evaluation content changes.
    EvaluationUpdated,
    /// Emitted when an evaluation moves to published.
    EvaluationPublished,
    /// Emitted when an evaluation moves to closed.
    EvaluationClosed,
    /// Emitted when an evaluation is soft-deleted.
    EvaluationDeleted,
    /// Emitted when a student submits answers.
    SubmissionCreated,
    /// Emitted when grading fields change before the final grade.
    SubmissionUpdated,
    /// Emitted when a submission is graded.
    SubmissionGraded,
    /// Emitted when an authorization check denies a principal.
    AuthorizationDenied,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvaluationCreated => "evaluation.created",
            Self::EvaluationUpdated => "evaluation.updated",
            Self::EvaluationPublished => "evaluation.published",
            Self::EvaluationClosed => "evaluation.closed",
            Self::EvaluationDeleted => "evaluation.deleted",
            Self::SubmissionCreated => "submission.created",
            Self::SubmissionUpdated => "submission.updated",
            Self::SubmissionGraded => "submission.graded",
            Self::AuthorizationDenied => "security.authorization.denied",
        }
    }
}
