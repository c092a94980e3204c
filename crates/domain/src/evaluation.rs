use std::fmt::{Display, Formatter};
use std::str::FromStr;

use assessa_core::{AppError, AppResult, NonEmptyString, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{ChangedFields, FieldPolicy, GuardedEntity, LifecycleState};

/// Tracked evaluation field names as reported in immutability violations.
pub mod fields {
    /// Owning course.
    pub const COURSE_ID: &str = "course_id";
    /// Creating instructor.
    pub const INSTRUCTOR_ID: &str = "instructor_id";
    /// Assignment or quiz.
    pub const EVALUATION_TYPE: &str = "evaluation_type";
    /// Title.
    pub const TITLE: &str = "title";
    /// Description.
    pub const DESCRIPTION: &str = "description";
    /// Maximum attainable score.
    pub const TOTAL_MARKS: &str = "total_marks";
    /// Weight in the course grade.
    pub const WEIGHT: &str = "weight";
    /// Submission deadline.
    pub const DUE_AT: &str = "due_at";
    /// Lifecycle status.
    pub const STATUS: &str = "status";
    /// Publication timestamp.
    pub const PUBLISHED_AT: &str = "published_at";
    /// Closing timestamp.
    pub const CLOSED_AT: &str = "closed_at";
    /// Soft-delete flag.
    pub const IS_DELETED: &str = "is_deleted";
}

const STATUS_FAMILY: &[&str] = &[fields::STATUS, fields::PUBLISHED_AT, fields::CLOSED_AT];

/// Highest accepted evaluation weight.
pub const MAX_EVALUATION_WEIGHT: u8 = 100;

/// Unique identifier for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluationId(Uuid);

impl EvaluationId {
    /// Creates a new random evaluation identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an evaluation identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EvaluationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(Uuid);

impl CourseId {
    /// Creates a new random course identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a course identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CourseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CourseId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Kind of assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationType {
    /// Take-home assignment.
    Assignment,
    /// Quiz.
    Quiz,
}

impl EvaluationType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Quiz => "quiz",
        }
    }
}

impl FromStr for EvaluationType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "assignment" => Ok(Self::Assignment),
            "quiz" => Ok(Self::Quiz),
            _ => Err(AppError::Validation(format!(
                "unknown evaluation type '{value}'"
            ))),
        }
    }
}

/// Evaluation lifecycle: draft, then published, then closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Content is editable and hidden from students.
    Draft,
    /// Visible to students and open for submissions; content is frozen.
    Published,
    /// No longer accepting submissions.
    Closed,
}

impl FromStr for EvaluationStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "closed" => Ok(Self::Closed),
            _ => Err(AppError::Validation(format!(
                "unknown evaluation status '{value}'"
            ))),
        }
    }
}

impl LifecycleState for EvaluationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Closed => "closed",
        }
    }

    fn field_policy(&self) -> FieldPolicy {
        match self {
            Self::Draft => FieldPolicy::Unrestricted,
            Self::Published | Self::Closed => FieldPolicy::Only(STATUS_FAMILY),
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Draft | Self::Published)
                | (Self::Published, Self::Published | Self::Closed)
                | (Self::Closed, Self::Closed)
        )
    }
}

/// Input payload for creating a draft evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationInput {
    /// Owning course.
    pub course_id: CourseId,
    /// Assignment or quiz.
    pub evaluation_type: EvaluationType,
    /// Title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Maximum attainable score, at least 1.
    pub total_marks: u32,
    /// Weight in the course grade, 0 to 100.
    pub weight: u8,
    /// Optional submission deadline.
    pub due_at: Option<DateTime<Utc>>,
}

/// Partial write proposed against an existing evaluation.
///
/// `None` leaves a field untouched. Nested options clear a value with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New evaluation type.
    pub evaluation_type: Option<EvaluationType>,
    /// New maximum score.
    pub total_marks: Option<u32>,
    /// New weight.
    pub weight: Option<u8>,
    /// New deadline.
    pub due_at: Option<Option<DateTime<Utc>>>,
    /// Target status.
    pub status: Option<EvaluationStatus>,
    /// Soft-delete flag.
    pub is_deleted: Option<bool>,
}

impl EvaluationPatch {
    /// Creates a patch that only moves the status.
    #[must_use]
    pub fn status(status: EvaluationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Full persisted state of an evaluation, used by storage adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationSnapshot {
    /// Identifier.
    pub id: EvaluationId,
    /// Owning course.
    pub course_id: CourseId,
    /// Creating instructor.
    pub instructor_id: UserId,
    /// Assignment or quiz.
    pub evaluation_type: EvaluationType,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Maximum attainable score.
    pub total_marks: u32,
    /// Weight in the course grade.
    pub weight: u8,
    /// Submission deadline.
    pub due_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: EvaluationStatus,
    /// Publication timestamp.
    pub published_at: Option<DateTime<Utc>>,
    /// Closing timestamp.
    pub closed_at: Option<DateTime<Utc>>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Storage revision.
    pub revision: i64,
}

/// Assessment definition owned by one instructor in one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    id: EvaluationId,
    course_id: CourseId,
    instructor_id: UserId,
    evaluation_type: EvaluationType,
    title: NonEmptyString,
    description: Option<String>,
    total_marks: u32,
    weight: u8,
    due_at: Option<DateTime<Utc>>,
    status: EvaluationStatus,
    published_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    revision: i64,
}

impl Evaluation {
    /// Creates a draft evaluation owned by `instructor_id`.
    pub fn new(input: EvaluationInput, instructor_id: UserId, now: DateTime<Utc>) -> AppResult<Self> {
        validate_total_marks(input.total_marks)?;
        validate_weight(input.weight)?;

        Ok(Self {
            id: EvaluationId::new(),
            course_id: input.course_id,
            instructor_id,
            evaluation_type: input.evaluation_type,
            title: NonEmptyString::new(input.title)?,
            description: input.description,
            total_marks: input.total_marks,
            weight: input.weight,
            due_at: input.due_at,
            status: EvaluationStatus::Draft,
            published_at: None,
            closed_at: None,
            is_deleted: false,
            created_at: now,
            revision: 0,
        })
    }

    /// Rebuilds an evaluation from persisted state.
    pub fn restore(snapshot: EvaluationSnapshot) -> AppResult<Self> {
        validate_total_marks(snapshot.total_marks)?;
        validate_weight(snapshot.weight)?;

        Ok(Self {
            id: snapshot.id,
            course_id: snapshot.course_id,
            instructor_id: snapshot.instructor_id,
            evaluation_type: snapshot.evaluation_type,
            title: NonEmptyString::new(snapshot.title)?,
            description: snapshot.description,
            total_marks: snapshot.total_marks,
            weight: snapshot.weight,
            due_at: snapshot.due_at,
            status: snapshot.status,
            published_at: snapshot.published_at,
            closed_at: snapshot.closed_at,
            is_deleted: snapshot.is_deleted,
            created_at: snapshot.created_at,
            revision: snapshot.revision,
        })
    }

    /// Builds the proposed after-value for a patch.
    ///
    /// Status moves stamp `published_at` or `closed_at` with `now` when unset.
    /// The result is not checked against the lifecycle; see [`crate::guard_update`].
    pub fn apply_patch(&self, patch: &EvaluationPatch, now: DateTime<Utc>) -> AppResult<Self> {
        let mut proposed = self.clone();

        if let Some(title) = &patch.title {
            proposed.title = NonEmptyString::new(title.clone())?;
        }
        if let Some(description) = &patch.description {
            proposed.description = description.clone();
        }
        if let Some(evaluation_type) = patch.evaluation_type {
            proposed.evaluation_type = evaluation_type;
        }
        if let Some(total_marks) = patch.total_marks {
            validate_total_marks(total_marks)?;
            proposed.total_marks = total_marks;
        }
        if let Some(weight) = patch.weight {
            validate_weight(weight)?;
            proposed.weight = weight;
        }
        if let Some(due_at) = patch.due_at {
            proposed.due_at = due_at;
        }
        if let Some(is_deleted) = patch.is_deleted {
            proposed.is_deleted = is_deleted;
        }
        if let Some(status) = patch.status
            && status != self.status
        {
            proposed.status = status;
            match status {
                EvaluationStatus::Published if proposed.published_at.is_none() => {
                    proposed.published_at = Some(now);
                }
                EvaluationStatus::Closed if proposed.closed_at.is_none() => {
                    proposed.closed_at = Some(now);
                }
                _ => {}
            }
        }

        Ok(proposed)
    }

    /// Returns a copy carrying the given storage revision.
    #[must_use]
    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> EvaluationId {
        self.id
    }

    /// Returns the owning course.
    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    /// Returns the creating instructor.
    #[must_use]
    pub fn instructor_id(&self) -> UserId {
        self.instructor_id
    }

    /// Returns the evaluation type.
    #[must_use]
    pub fn evaluation_type(&self) -> EvaluationType {
        self.evaluation_type
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &NonEmptyString {
        &self.title
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the maximum attainable score.
    #[must_use]
    pub fn total_marks(&self) -> u32 {
        self.total_marks
    }

    /// Returns the weight in the course grade.
    #[must_use]
    pub fn weight(&self) -> u8 {
        self.weight
    }

    /// Returns the submission deadline.
    #[must_use]
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> EvaluationStatus {
        self.status
    }

    /// Returns the publication timestamp.
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    /// Returns the closing timestamp.
    #[must_use]
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Returns the soft-delete flag.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the storage revision.
    #[must_use]
    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// Returns whether students can see the evaluation.
    #[must_use]
    pub fn is_visible_to_students(&self) -> bool {
        !self.is_deleted && self.status != EvaluationStatus::Draft
    }

    /// Returns whether new submissions are accepted.
    #[must_use]
    pub fn accepts_submissions(&self) -> bool {
        !self.is_deleted && self.status == EvaluationStatus::Published
    }
}

impl GuardedEntity for Evaluation {
    type State = EvaluationStatus;

    fn lifecycle_state(&self) -> EvaluationStatus {
        self.status
    }

    fn changed_fields(&self, proposed: &Self) -> ChangedFields {
        ChangedFields::new()
            .compare(fields::COURSE_ID, &self.course_id, &proposed.course_id)
            .compare(fields::INSTRUCTOR_ID, &self.instructor_id, &proposed.instructor_id)
            .compare(
                fields::EVALUATION_TYPE,
                &self.evaluation_type,
                &proposed.evaluation_type,
            )
            .compare(fields::TITLE, &self.title, &proposed.title)
            .compare(fields::DESCRIPTION, &self.description, &proposed.description)
            .compare(fields::TOTAL_MARKS, &self.total_marks, &proposed.total_marks)
            .compare(fields::WEIGHT, &self.weight, &proposed.weight)
            .compare(fields::DUE_AT, &self.due_at, &proposed.due_at)
            .compare(fields::STATUS, &self.status, &proposed.status)
            .compare(fields::PUBLISHED_AT, &self.published_at, &proposed.published_at)
            .compare(fields::CLOSED_AT, &self.closed_at, &proposed.closed_at)
            .compare(fields::IS_DELETED, &self.is_deleted, &proposed.is_deleted)
    }
}

fn validate_total_marks(total_marks: u32) -> AppResult<()> {
    if total_marks == 0 {
        return Err(AppError::Validation(
            "total_marks must be at least 1".to_owned(),
        ));
    }

    Ok(())
}

fn validate_weight(weight: u8) -> AppResult<()> {
    if weight > MAX_EVALUATION_WEIGHT {
        return Err(AppError::Validation(format!(
            "weight must be between 0 and {MAX_EVALUATION_WEIGHT}, got {weight}"
        )));
    }

    Ok(())
}
