//! Validity-window cascade for links, self-links, and owned children.
//!
//! Every dependent interval is tagged with a `[first, last]` range of its
//! owner's iterations, and every dependent mutation advances the owner by
//! exactly one iteration:
//!
//! * create: the owner advances from `k` to `k + 1`; the new interval is
//!   `[k + 1, INFINITY]`.
//! * replace: the old interval closes at `k` (pre-bump), the owner advances,
//!   the replacement opens at `k + 1`, so `closed.last + 1 == opened.first`.
//! * remove: the old interval closes at `k`; nothing reopens.
//!
//! The single-element operations are the batch operations applied to a
//! batch of one, so both paths share validation and write ordering.

mod batch;
mod constraint;

use serde_json::Value as Json;
use tracing::debug;

use crate::ledger::IterationLedger;
use crate::lookup::LookupService;
use crate::schema::RelationId;
use crate::store::condition::dependent_columns as dc;
use crate::store::rows::Alias;
use crate::store::Session;
use crate::types::{DependentId, DependentRecord, EntityId, EntityRecord, LedgerError, NewDependent, Result};

pub use constraint::{ConstraintRegistry, RelationPredicate};

/// Replacement content for an existing dependent.
///
/// The logical id and the owner stay; the other side and payload change.
#[derive(Clone, Debug, PartialEq)]
pub struct DependentChange {
    /// New other side; must be `None` for owned children.
    pub other: Option<EntityId>,
    /// New payload.
    pub attrs: Json,
}

impl DependentChange {
    /// Repoints a link or self-link.
    pub fn repoint(other: impl Into<EntityId>) -> Self {
        Self {
            other: Some(other.into()),
            attrs: Json::Null,
        }
    }

    /// Replaces the payload of an owned child.
    pub fn payload(attrs: Json) -> Self {
        Self { other: None, attrs }
    }

    /// Sets the payload.
    pub fn with_attrs(mut self, attrs: Json) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Outcome of opening a dependent.
#[derive(Clone, Debug, PartialEq)]
pub struct Opened {
    /// The owner's promoted row.
    pub owner: EntityRecord,
    /// Note recorded on the owner's archived row; joined with the notes of
    /// other elements of the same batch that share the owner.
    pub note: String,
    /// The open interval.
    pub dependent: DependentRecord,
}

/// Outcome of replacing or removing a dependent.
#[derive(Clone, Debug, PartialEq)]
pub struct Closed {
    /// The owner's promoted row.
    pub owner: EntityRecord,
    /// Note recorded on the owner's archived row.
    pub note: String,
    /// The archived interval, closed at the owner's pre-bump iteration.
    pub closed: DependentRecord,
    /// The replacement interval, if any.
    pub opened: Option<DependentRecord>,
}

/// Stateless cascade service.
#[derive(Clone)]
pub struct ValidityCascade {
    ledger: IterationLedger,
}

impl ValidityCascade {
    /// Wraps a ledger.
    pub fn new(ledger: IterationLedger) -> Self {
        Self { ledger }
    }

    /// The ledger used to advance owners.
    pub fn ledger(&self) -> &IterationLedger {
        &self.ledger
    }

    fn lookup(&self) -> &LookupService {
        self.ledger.lookup()
    }

    /// Opens a new dependent and advances its owner.
    pub fn on_create(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        new: NewDependent,
    ) -> Result<Opened> {
        let mut out = self.create_batch(cx, relation, vec![new])?;
        let opened = out
            .pop()
            .ok_or_else(|| LedgerError::invariant("create produced no interval"))?;
        debug!(
            relation = %cx.schema().relation(relation).name,
            id = %opened.dependent.id,
            owner = %opened.owner.id,
            iteration = opened.owner.iteration,
            "cascade.create"
        );
        Ok(opened)
    }

    /// Closes the open interval of `id`, advances the owner, and opens
    /// `replacement` at the post-bump iteration when given.
    pub fn on_replace_or_remove(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        id: &DependentId,
        replacement: Option<DependentChange>,
    ) -> Result<Closed> {
        let mut out = self.replace_or_remove_batch(cx, relation, vec![(id.clone(), replacement)])?;
        let closed = out
            .pop()
            .ok_or_else(|| LedgerError::invariant("replace produced no interval"))?;
        debug!(
            relation = %cx.schema().relation(relation).name,
            id = %id,
            closed_at = closed.closed.last_iteration,
            reopened = closed.opened.is_some(),
            "cascade.close"
        );
        Ok(closed)
    }

    /// Replaces the content of dependent `id`.
    pub fn on_replace(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        id: &DependentId,
        change: DependentChange,
    ) -> Result<Closed> {
        self.on_replace_or_remove(cx, relation, id, Some(change))
    }

    /// Removes dependent `id`.
    pub fn on_remove(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        id: &DependentId,
    ) -> Result<Closed> {
        self.on_replace_or_remove(cx, relation, id, None)
    }

    /// The open interval of `id`, if any.
    pub fn current(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        id: &DependentId,
    ) -> Result<Option<DependentRecord>> {
        self.lookup()
            .read_one(cx, &cx.schema().relation(relation).table, id.as_str())
    }

    /// Open intervals owned by `owner`, as stored.
    ///
    /// For symmetric relations use [`crate::symmetric::SymmetricAdapter`],
    /// which also returns rows stored with `owner` on the other side.
    pub fn dependents_of(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        owner: &EntityId,
    ) -> Result<Vec<DependentRecord>> {
        self.lookup().read_by_foreign_key(
            cx,
            &cx.schema().relation(relation).table,
            dc::OWNER_ID,
            &[owner.as_str()],
            Alias::Current,
            None,
        )
    }

    /// Open intervals whose other side is `other` (reverse lookup).
    pub fn referenced_by(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        other: &EntityId,
    ) -> Result<Vec<DependentRecord>> {
        self.lookup().read_by_foreign_key(
            cx,
            &cx.schema().relation(relation).table,
            dc::OTHER_ID,
            &[other.as_str()],
            Alias::Current,
            None,
        )
    }

    /// Every interval ever stored for `id`, ordered by first iteration.
    pub fn intervals(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        id: &DependentId,
    ) -> Result<Vec<DependentRecord>> {
        let mut rows: Vec<DependentRecord> = self.lookup().read_by_foreign_key(
            cx,
            &cx.schema().relation(relation).table,
            dc::ID,
            &[id.as_str()],
            Alias::History,
            None,
        )?;
        rows.sort_by_key(|row| row.first_iteration);
        Ok(rows)
    }
}
