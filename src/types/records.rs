use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{DependentId, EntityId, Iteration, INFINITY};

/// Denormalized display fields used in update notes and mirrored on
/// dependent rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
    /// Human readable name.
    pub name: Option<String>,
    /// Catalog or part number.
    pub number: Option<String>,
    /// Lifecycle state label.
    pub state: Option<String>,
}

impl DisplayFields {
    /// Display fields carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the number.
    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    /// Sets the state.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Name if present, otherwise number.
    pub fn label(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.number.as_deref().filter(|s| !s.is_empty()))
    }
}

/// One stored row of an iterated entity.
///
/// Storage identity is `(id, iteration)`; every change appends a row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Logical id, identical across all iterations.
    pub id: EntityId,
    /// Position in the entity's history. Zero until initialized.
    pub iteration: Iteration,
    /// Whether this row is the authoritative one for `id`.
    pub latest: bool,
    /// Description of the most recent change.
    pub update_note: Option<String>,
    /// Display fields.
    pub display: DisplayFields,
    /// Free-form attributes.
    pub attrs: Json,
}

impl EntityRecord {
    /// A not yet initialized entity.
    pub fn new(id: impl Into<EntityId>, display: DisplayFields) -> Self {
        Self {
            id: id.into(),
            iteration: 0,
            latest: false,
            update_note: None,
            display,
            attrs: Json::Null,
        }
    }

    /// Replaces the attribute payload.
    pub fn with_attrs(mut self, attrs: Json) -> Self {
        self.attrs = attrs;
        self
    }

    /// Current iteration.
    pub fn iteration(&self) -> Iteration {
        self.iteration
    }

    /// Latest flag.
    pub fn last_version_flag(&self) -> bool {
        self.latest
    }

    /// `true` once the ledger has stamped the first iteration.
    pub fn is_initialized(&self) -> bool {
        self.iteration >= super::FIRST_ITERATION
    }

    /// Compares user-visible content, ignoring ledger bookkeeping.
    pub(crate) fn same_content(&self, other: &EntityRecord) -> bool {
        self.display == other.display && self.attrs == other.attrs
    }
}

/// Inclusive `[first, last]` range of owner iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Owner iteration at which the interval opened.
    pub first: Iteration,
    /// Owner iteration at which it closed, or [`INFINITY`].
    pub last: Iteration,
}

impl ValidityWindow {
    /// An interval opened at `first`.
    pub const fn open(first: Iteration) -> Self {
        Self {
            first,
            last: INFINITY,
        }
    }

    /// Whether the interval is still in effect.
    pub fn is_open(&self) -> bool {
        self.last == INFINITY
    }

    /// Whether owner iteration `k` falls inside the interval.
    pub fn contains(&self, k: Iteration) -> bool {
        self.first <= k && k <= self.last
    }

    /// Whether `next` starts exactly one iteration after this one ends.
    pub fn abuts(&self, next: &ValidityWindow) -> bool {
        !self.is_open() && self.last + 1 == next.first
    }

    /// Whether the two intervals share an iteration.
    pub fn overlaps(&self, other: &ValidityWindow) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// One interval of a dependent relation row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependentRecord {
    /// Logical dependent id, shared by all its intervals.
    pub id: DependentId,
    /// Owning entity (left side for self-links).
    pub owner: EntityId,
    /// Other side; `None` for owned children.
    pub other: Option<EntityId>,
    /// Owner iteration at which this interval opened.
    pub first_iteration: Iteration,
    /// Owner iteration at which it closed, or [`INFINITY`].
    pub last_iteration: Iteration,
    /// Owner display fields at the time the interval opened.
    pub owner_display: DisplayFields,
    /// Other side display fields at the time the interval opened.
    pub other_display: DisplayFields,
    /// Relation payload.
    pub attrs: Json,
}

impl DependentRecord {
    /// The validity window of this row.
    pub fn window(&self) -> ValidityWindow {
        ValidityWindow {
            first: self.first_iteration,
            last: self.last_iteration,
        }
    }

    /// Whether the interval is still in effect.
    pub fn is_open(&self) -> bool {
        self.last_iteration == INFINITY
    }

    /// Whether the row was in effect at owner iteration `k`.
    pub fn in_effect_at(&self, k: Iteration) -> bool {
        self.window().contains(k)
    }

    /// Swaps the stored sides, used for rows reached through the mirrored
    /// column of a symmetric relation.
    pub fn mirrored(mut self) -> Self {
        if let Some(other) = self.other.take() {
            self.other = Some(std::mem::replace(&mut self.owner, other));
            std::mem::swap(&mut self.owner_display, &mut self.other_display);
        }
        self
    }
}

/// Caller input for opening a new dependent.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDependent {
    /// Logical dependent id; must never have been used before.
    pub id: DependentId,
    /// Owning entity.
    pub owner: EntityId,
    /// Other side, required for links and self-links.
    pub other: Option<EntityId>,
    /// Relation payload.
    pub attrs: Json,
}

impl NewDependent {
    /// A link or self-link between `owner` and `other`.
    pub fn link(
        id: impl Into<DependentId>,
        owner: impl Into<EntityId>,
        other: impl Into<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            other: Some(other.into()),
            attrs: Json::Null,
        }
    }

    /// An owned child of `owner`.
    pub fn child(id: impl Into<DependentId>, owner: impl Into<EntityId>, attrs: Json) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            other: None,
            attrs,
        }
    }

    /// Replaces the payload.
    pub fn with_attrs(mut self, attrs: Json) -> Self {
        self.attrs = attrs;
        self
    }
}
