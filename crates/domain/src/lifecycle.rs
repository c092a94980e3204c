//! Field-level write guard shared by lifecycle-bound entities.
//!
//! A write is described by the persisted snapshot (`before`) and the proposed
//! value (`after`). The guard computes which tracked fields differ and checks
//! them against the policy of the state `before` is in. It also rejects
//! status moves the state machine does not allow.

use std::collections::BTreeSet;
use std::fmt::Debug;

use assessa_core::{AppError, AppResult};

/// Which fields a write may change while an entity sits in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Any tracked field may change.
    Unrestricted,
    /// Only the listed fields may change.
    Only(&'static [&'static str]),
}

impl FieldPolicy {
    /// Returns whether `field` may change under this policy.
    #[must_use]
    pub fn permits(&self, field: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Only(allowed) => allowed.contains(&field),
        }
    }
}

/// Tagged lifecycle state with its field policy and legal successors.
pub trait LifecycleState: Copy + Eq + Debug {
    /// Returns a stable storage value for the state.
    fn as_str(&self) -> &'static str;

    /// Returns the field policy applied to writes made from this state.
    fn field_policy(&self) -> FieldPolicy;

    /// Returns whether a write may move the entity from this state to `next`.
    fn can_transition_to(&self, next: Self) -> bool;
}

/// Entity whose writes are checked by [`guard_update`].
pub trait GuardedEntity {
    /// Lifecycle state type of the entity.
    type State: LifecycleState;

    /// Returns the entity's current lifecycle state.
    fn lifecycle_state(&self) -> Self::State;

    /// Returns tracked fields whose value differs in `proposed`.
    fn changed_fields(&self, proposed: &Self) -> ChangedFields;
}

/// Names of tracked fields that differ between two versions of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFields(BTreeSet<&'static str>);

impl ChangedFields {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `field` when the two values differ.
    #[must_use]
    pub fn compare<T: PartialEq + ?Sized>(mut self, field: &'static str, before: &T, after: &T) -> Self {
        if before != after {
            self.0.insert(field);
        }
        self
    }

    /// Returns whether `field` changed.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    /// Returns whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns changed field names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().copied()
    }
}

/// Checks a change set against the policy of `state`.
///
/// Offending fields are reported sorted by name.
pub fn guard_write<S: LifecycleState>(state: S, changed: &ChangedFields) -> AppResult<()> {
    let policy = state.field_policy();
    let offending: Vec<String> = changed
        .iter()
        .filter(|field| !policy.permits(field))
        .map(str::to_owned)
        .collect();

    if offending.is_empty() {
        Ok(())
    } else {
        Err(AppError::ImmutabilityViolation(offending))
    }
}

/// Validates a proposed write against the persisted snapshot it replaces.
///
/// Returns the change set so callers can derive audit detail from it.
pub fn guard_update<E: GuardedEntity>(before: &E, after: &E) -> AppResult<ChangedFields> {
    let from = before.lifecycle_state();
    let to = after.lifecycle_state();
    let changed = before.changed_fields(after);

    guard_write(from, &changed)?;

    if !from.can_transition_to(to) {
        return Err(AppError::Validation(format!(
            "status cannot move from '{}' to '{}'",
            from.as_str(),
            to.as_str()
        )));
    }

    Ok(changed)
}
