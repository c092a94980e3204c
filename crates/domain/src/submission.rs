use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use assessa_core::{AppError, AppResult, NonEmptyString, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EvaluationId;
use crate::lifecycle::{ChangedFields, FieldPolicy, GuardedEntity, LifecycleState};

/// Tracked submission field names as reported in immutability violations.
pub mod fields {
    /// Target evaluation.
    pub const EVALUATION_ID: &str = "evaluation_id";
    /// Submitting student.
    pub const STUDENT_ID: &str = "student_id";
    /// Submitted answers.
    pub const ANSWERS: &str = "answers";
    /// Submission timestamp.
    pub const SUBMITTED_AT: &str = "submitted_at";
    /// Lifecycle status.
    pub const STATUS: &str = "status";
    /// Awarded score.
    pub const TOTAL_SCORE: &str = "total_score";
    /// Grader feedback.
    pub const FEEDBACK: &str = "feedback";
    /// Grading user.
    pub const GRADED_BY: &str = "graded_by";
    /// Grading timestamp.
    pub const GRADED_AT: &str = "graded_at";
}

const GRADING_FIELDS: &[&str] = &[
    fields::TOTAL_SCORE,
    fields::FEEDBACK,
    fields::GRADED_BY,
    fields::GRADED_AT,
    fields::STATUS,
];

const STATUS_ONLY: &[&str] = &[fields::STATUS];

/// Maximum length of one answer's response text, in characters.
pub const MAX_RESPONSE_LENGTH: usize = 10_000;

/// Maximum length of grader feedback, in characters.
pub const MAX_FEEDBACK_LENGTH: usize = 10_000;

/// Unique identifier for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Creates a new random submission identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a submission identifier from an existing UUID value.
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

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubmissionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One response to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    question_id: NonEmptyString,
    response_text: String,
}

impl Answer {
    /// Creates a validated answer.
    pub fn new(question_id: impl Into<String>, response_text: impl Into<String>) -> AppResult<Self> {
        let question_id = NonEmptyString::new(question_id)?;
        let response_text = response_text.into();

        if response_text.chars().count() > MAX_RESPONSE_LENGTH {
            return Err(AppError::Validation(format!(
                "response for question '{}' exceeds {MAX_RESPONSE_LENGTH} characters",
                question_id.as_str()
            )));
        }

        Ok(Self {
            question_id,
            response_text,
        })
    }

    /// Returns the question identifier.
    #[must_use]
    pub fn question_id(&self) -> &str {
        self.question_id.as_str()
    }

    /// Returns the response text.
    #[must_use]
    pub fn response_text(&self) -> &str {
        self.response_text.as_str()
    }
}

/// Submission lifecycle: submitted, then graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Answers are in and frozen; awaiting a grade.
    Submitted,
    /// Grade recorded and frozen.
    Graded,
}

impl FromStr for SubmissionStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "submitted" => Ok(Self::Submitted),
            "graded" => Ok(Self::Graded),
            _ => Err(AppError::Validation(format!(
                "unknown submission status '{value}'"
            ))),
        }
    }
}

impl LifecycleState for SubmissionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Graded => "graded",
        }
    }

    fn field_policy(&self) -> FieldPolicy {
        match self {
            Self::Submitted => FieldPolicy::Only(GRADING_FIELDS),
            Self::Graded => FieldPolicy::Only(STATUS_ONLY),
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        !matches!((self, next), (Self::Graded, Self::Submitted))
    }
}

/// Partial write proposed for a student's submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionPatch {
    /// Answers; required when the submission does not exist yet.
    pub answers: Option<Vec<Answer>>,
    /// Awarded score.
    pub total_score: Option<f64>,
    /// Grader feedback.
    pub feedback: Option<String>,
    /// Target status.
    pub status: Option<SubmissionStatus>,
}

/// Full persisted state of a submission, used by storage adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionSnapshot {
    /// Identifier.
    pub id: SubmissionId,
    /// Target evaluation.
    pub evaluation_id: EvaluationId,
    /// Submitting student.
    pub student_id: UserId,
    /// Answers in question order.
    pub answers: Vec<Answer>,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: SubmissionStatus,
    /// Awarded score.
    pub total_score: Option<f64>,
    /// Grader feedback.
    pub feedback: Option<String>,
    /// Grading user.
    pub graded_by: Option<UserId>,
    /// Grading timestamp.
    pub graded_at: Option<DateTime<Utc>>,
    /// Storage revision.
    pub revision: i64,
}

/// One student's answer set for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    id: SubmissionId,
    evaluation_id: EvaluationId,
    student_id: UserId,
    answers: Vec<Answer>,
    submitted_at: DateTime<Utc>,
    status: SubmissionStatus,
    total_score: Option<f64>,
    feedback: Option<String>,
    graded_by: Option<UserId>,
    graded_at: Option<DateTime<Utc>>,
    revision: i64,
}

impl Submission {
    /// Creates a fresh submission in the submitted state.
    pub fn new(
        evaluation_id: EvaluationId,
        student_id: UserId,
        answers: Vec<Answer>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        validate_answers(&answers)?;

        Ok(Self {
            id: SubmissionId::new(),
            evaluation_id,
            student_id,
            answers,
            submitted_at: now,
            status: SubmissionStatus::Submitted,
            total_score: None,
            feedback: None,
            graded_by: None,
            graded_at: None,
            revision: 0,
        })
    }

    /// Rebuilds a submission from persisted state.
    pub fn restore(snapshot: SubmissionSnapshot) -> AppResult<Self> {
        if let Some(total_score) = snapshot.total_score {
            validate_score(total_score)?;
        }

        Ok(Self {
            id: snapshot.id,
            evaluation_id: snapshot.evaluation_id,
            student_id: snapshot.student_id,
            answers: snapshot.answers,
            submitted_at: snapshot.submitted_at,
            status: snapshot.status,
            total_score: snapshot.total_score,
            feedback: snapshot.feedback,
            graded_by: snapshot.graded_by,
            graded_at: snapshot.graded_at,
            revision: snapshot.revision,
        })
    }

    /// Builds the proposed after-value for a patch written by `writer`.
    ///
    /// Moving to graded requires a score and stamps `graded_by` and `graded_at`.
    /// The result is not checked against the lifecycle; see [`crate::guard_update`].
    pub fn apply_patch(
        &self,
        patch: &SubmissionPatch,
        writer: UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let mut proposed = self.clone();

        if let Some(answers) = &patch.answers {
            proposed.answers = answers.clone();
        }
        if let Some(total_score) = patch.total_score {
            validate_score(total_score)?;
            proposed.total_score = Some(total_score);
        }
        if let Some(feedback) = &patch.feedback {
            validate_feedback(feedback)?;
            proposed.feedback = Some(feedback.clone());
        }
        if let Some(status) = patch.status
            && status != self.status
        {
            proposed.status = status;
            if status == SubmissionStatus::Graded {
                if proposed.total_score.is_none() {
                    return Err(AppError::Validation(
                        "grading a submission requires total_score".to_owned(),
                    ));
                }
                proposed.graded_by = Some(writer);
                proposed.graded_at = Some(now);
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
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    /// Returns the target evaluation.
    #[must_use]
    pub fn evaluation_id(&self) -> EvaluationId {
        self.evaluation_id
    }

    /// Returns the submitting student.
    #[must_use]
    pub fn student_id(&self) -> UserId {
        self.student_id
    }

    /// Returns answers in submission order.
    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Returns the submission timestamp.
    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    /// Returns the awarded score.
    #[must_use]
    pub fn total_score(&self) -> Option<f64> {
        self.total_score
    }

    /// Returns grader feedback.
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Returns the grading user.
    #[must_use]
    pub fn graded_by(&self) -> Option<UserId> {
        self.graded_by
    }

    /// Returns the grading timestamp.
    #[must_use]
    pub fn graded_at(&self) -> Option<DateTime<Utc>> {
        self.graded_at
    }

    /// Returns the storage revision.
    #[must_use]
    pub fn revision(&self) -> i64 {
        self.revision
    }
}

impl GuardedEntity for Submission {
    type State = SubmissionStatus;

    fn lifecycle_state(&self) -> SubmissionStatus {
        self.status
    }

    fn changed_fields(&self, proposed: &Self) -> ChangedFields {
        ChangedFields::new()
            .compare(fields::EVALUATION_ID, &self.evaluation_id, &proposed.evaluation_id)
            .compare(fields::STUDENT_ID, &self.student_id, &proposed.student_id)
            .compare(fields::ANSWERS, &self.answers, &proposed.answers)
            .compare(fields::SUBMITTED_AT, &self.submitted_at, &proposed.submitted_at)
            .compare(fields::STATUS, &self.status, &proposed.status)
            .compare(fields::TOTAL_SCORE, &self.total_score, &proposed.total_score)
            .compare(fields::FEEDBACK, &self.feedback, &proposed.feedback)
            .compare(fields::GRADED_BY, &self.graded_by, &proposed.graded_by)
            .compare(fields::GRADED_AT, &self.graded_at, &proposed.graded_at)
    }
}

/// Checks a score against the evaluation's maximum.
pub fn validate_score_within(total_score: f64, total_marks: u32) -> AppResult<()> {
    validate_score(total_score)?;

    if total_score > f64::from(total_marks) {
        return Err(AppError::Validation(format!(
            "total_score {total_score} exceeds total_marks {total_marks}"
        )));
    }

    Ok(())
}

fn validate_score(total_score: f64) -> AppResult<()> {
    if !total_score.is_finite() || total_score < 0.0 {
        return Err(AppError::Validation(format!(
            "total_score must be a non-negative number, got {total_score}"
        )));
    }

    Ok(())
}

fn validate_feedback(feedback: &str) -> AppResult<()> {
    if feedback.chars().count() > MAX_FEEDBACK_LENGTH {
        return Err(AppError::Validation(format!(
            "feedback exceeds {MAX_FEEDBACK_LENGTH} characters"
        )));
    }

    Ok(())
}

fn validate_answers(answers: &[Answer]) -> AppResult<()> {
    if answers.is_empty() {
        return Err(AppError::Validation(
            "a submission requires at least one answer".to_owned(),
        ));
    }

    let mut seen = HashSet::new();
    for answer in answers {
        if !seen.insert(answer.question_id()) {
            return Err(AppError::Validation(format!(
                "question '{}' is answered more than once",
                answer.question_id()
            )));
        }
    }

    Ok(())
}
