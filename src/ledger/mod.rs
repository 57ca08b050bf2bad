//! Per-entity append-only iteration ledger.
//!
//! An entity's history is the contiguous sequence of rows `1..=K` sharing one
//! logical id; exactly one of them carries `latest = true`. Advancing archives
//! the pre-change state and hands back `iteration + 1`; the caller stamps
//! that onto the current row and persists it, which lets cascades batch the
//! promotion writes.

mod policy;

use std::slice;

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::lookup::LookupService;
use crate::note::{entity_note, Action};
use crate::schema::EntityTypeId;
use crate::store::condition::entity_columns as ec;
use crate::store::rows::Alias;
use crate::store::Session;
use crate::types::{EntityRecord, Iteration, LedgerError, Result, FIRST_ITERATION};

pub use policy::{AlwaysBump, InPlaceStates, StatePolicy};

/// Result of [`IterationLedger::revise`].
#[derive(Clone, Debug, PartialEq)]
pub enum Revision {
    /// Nothing user-visible changed; no write happened.
    Unchanged(EntityRecord),
    /// Only the state changed and the policy kept the iteration.
    InPlace(EntityRecord),
    /// The entity moved to a new iteration.
    Advanced(EntityRecord),
}

impl Revision {
    /// The row that is current after the revision.
    pub fn record(&self) -> &EntityRecord {
        match self {
            Revision::Unchanged(r) | Revision::InPlace(r) | Revision::Advanced(r) => r,
        }
    }

    /// Consumes the revision, returning the current row.
    pub fn into_record(self) -> EntityRecord {
        match self {
            Revision::Unchanged(r) | Revision::InPlace(r) | Revision::Advanced(r) => r,
        }
    }
}

/// Stateless ledger service.
#[derive(Clone)]
pub struct IterationLedger {
    lookup: LookupService,
}

impl IterationLedger {
    /// Wraps a lookup service.
    pub fn new(lookup: LookupService) -> Self {
        Self { lookup }
    }

    /// The lookup service used for reads and bulk writes.
    pub fn lookup(&self) -> &LookupService {
        &self.lookup
    }

    /// Stamps iteration 1 and the latest flag. Valid only once.
    pub fn initialize(&self, entity: &mut EntityRecord) -> Result<()> {
        if entity.is_initialized() {
            return Err(LedgerError::invariant(format!(
                "entity '{}' is already initialized at iteration {}",
                entity.id, entity.iteration
            )));
        }
        entity.iteration = FIRST_ITERATION;
        entity.latest = true;
        Ok(())
    }

    /// Initializes and inserts a new entity.
    pub fn create(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        entity: EntityRecord,
    ) -> Result<EntityRecord> {
        let mut created = self.create_batch(cx, ty, vec![entity])?;
        created
            .pop()
            .ok_or_else(|| LedgerError::invariant("create produced no row"))
    }

    /// Initializes and inserts several new entities with one lookup and one
    /// insert statement.
    pub fn create_batch(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        mut entities: Vec<EntityRecord>,
    ) -> Result<Vec<EntityRecord>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        let table = &cx.schema().entity(ty).table;
        let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        ensure_distinct(&ids, "create")?;
        for id in &ids {
            self.lookup.check_id(id)?;
        }
        let existing = self
            .lookup
            .read_many_tolerant::<EntityRecord>(cx, table, &ids)?;
        if let Some(found) = existing.into_iter().flatten().next() {
            return Err(LedgerError::invariant(format!(
                "entity '{}' already exists in {table}",
                found.id
            )));
        }
        for entity in &mut entities {
            self.initialize(entity)?;
        }
        self.lookup.insert_entities(cx, table, &entities)?;
        debug!(table = %table, count = entities.len(), "ledger.create");
        Ok(entities)
    }

    /// Archives the stored row `entity` was read from (with
    /// `latest = false` and `note`) and returns the iteration to stamp on the
    /// promoted row.
    ///
    /// `entity` must carry the stored latest iteration; a stale record is an
    /// `InvariantViolation` and an unknown id a `MissingReference`.
    pub fn advance(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        entity: &EntityRecord,
        note: Option<&str>,
    ) -> Result<Iteration> {
        require_initialized(entity)?;
        let entity_type = cx.schema().entity(ty);
        let table = &entity_type.table;
        let mut archived = self
            .lookup
            .read_one::<EntityRecord>(cx, table, entity.id.as_str())?
            .ok_or_else(|| LedgerError::missing(&entity_type.name, entity.id.as_str()))?;
        if archived.iteration != entity.iteration {
            return Err(stale(entity, archived.iteration));
        }
        archived.latest = false;
        if let Some(note) = note {
            archived.update_note = Some(note.to_string());
        }
        self.lookup
            .archive_insert(cx, table, slice::from_ref(&archived))?;
        let next = entity.iteration + 1;
        debug!(table = %table, id = %entity.id, from = entity.iteration, to = next, "ledger.advance");
        Ok(next)
    }

    /// Batch form of [`IterationLedger::advance`]: one read of the stored
    /// pre-change rows, one archive statement. Returns next iterations in
    /// input order. Owners must be distinct.
    pub fn advance_batch(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        entities: &[EntityRecord],
        notes: &[Option<String>],
    ) -> Result<Vec<Iteration>> {
        if entities.len() != notes.len() {
            return Err(LedgerError::invariant(format!(
                "advance_batch got {} entities but {} notes",
                entities.len(),
                notes.len()
            )));
        }
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        for entity in entities {
            require_initialized(entity)?;
        }
        let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        ensure_distinct(&ids, "advance_batch")?;
        let kind = &cx.schema().entity(ty).name;
        let table = &cx.schema().entity(ty).table;
        let snapshots = self
            .lookup
            .read_many::<EntityRecord>(cx, table, kind, &ids)?;
        let mut archived = Vec::with_capacity(snapshots.len());
        for ((snapshot, entity), note) in snapshots.into_iter().zip(entities).zip(notes) {
            if snapshot.iteration != entity.iteration {
                return Err(stale(entity, snapshot.iteration));
            }
            let mut row = snapshot;
            row.latest = false;
            if let Some(note) = note {
                row.update_note = Some(note.clone());
            }
            archived.push(row);
        }
        self.lookup.archive_insert(cx, table, &archived)?;
        info!(table = %table, count = archived.len(), "ledger.advance_batch");
        Ok(entities.iter().map(|e| e.iteration + 1).collect())
    }

    /// Stamps a promoted iteration onto `entity`.
    ///
    /// The note of the change lives on the archived row, so a freshly
    /// promoted row starts without one.
    pub fn promote(entity: &mut EntityRecord, next: Iteration) {
        entity.iteration = next;
        entity.latest = true;
        entity.update_note = None;
    }

    /// Advances `owner` and persists the promoted row.
    pub fn bump(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        owner: &EntityRecord,
        note: Option<&str>,
    ) -> Result<EntityRecord> {
        let next = self.advance(cx, ty, owner, note)?;
        let mut promoted = owner.clone();
        Self::promote(&mut promoted, next);
        let table = &cx.schema().entity(ty).table;
        self.lookup
            .bulk_update(cx, table, slice::from_ref(&promoted))?;
        Ok(promoted)
    }

    /// Advances distinct owners and persists all promoted rows with one
    /// archive statement and one promotion statement.
    pub fn bump_batch(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        owners: &[EntityRecord],
        notes: &[Option<String>],
    ) -> Result<Vec<EntityRecord>> {
        let next = self.advance_batch(cx, ty, owners, notes)?;
        let promoted: Vec<EntityRecord> = owners
            .iter()
            .zip(next)
            .map(|(owner, next)| {
                let mut row = owner.clone();
                Self::promote(&mut row, next);
                row
            })
            .collect();
        let table = &cx.schema().entity(ty).table;
        self.lookup.bulk_update(cx, table, &promoted)?;
        Ok(promoted)
    }

    /// Applies a change to the entity's own fields.
    ///
    /// `changed` must carry the iteration it was read at. Unchanged content
    /// is a no-op; a pure state transition consults the store's
    /// [`StatePolicy`]; anything else advances the ledger.
    pub fn revise(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        changed: EntityRecord,
        note: Option<&str>,
    ) -> Result<Revision> {
        let notes = [note.map(str::to_string)];
        let mut out = self.revise_batch(cx, ty, vec![changed], &notes)?;
        out.pop()
            .ok_or_else(|| LedgerError::invariant("revise produced no row"))
    }

    /// Batch form of [`IterationLedger::revise`].
    pub fn revise_batch(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        changed: Vec<EntityRecord>,
        notes: &[Option<String>],
    ) -> Result<Vec<Revision>> {
        if changed.len() != notes.len() {
            return Err(LedgerError::invariant(format!(
                "revise_batch got {} entities but {} notes",
                changed.len(),
                notes.len()
            )));
        }
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        let entity_type = cx.schema().entity(ty);
        let ids: Vec<&str> = changed.iter().map(|e| e.id.as_str()).collect();
        ensure_distinct(&ids, "revise_batch")?;
        let stored =
            self.lookup
                .read_many::<EntityRecord>(cx, &entity_type.table, &entity_type.name, &ids)?;

        let policy = cx.state_policy();
        let mut archived = Vec::new();
        let mut promoted = Vec::new();
        let mut in_place = Vec::new();
        let mut out = Vec::with_capacity(changed.len());
        for ((mut next, before), note) in changed.into_iter().zip(stored).zip(notes) {
            if next.iteration != before.iteration {
                return Err(stale(&next, before.iteration));
            }
            if before.same_content(&next) {
                out.push(Revision::Unchanged(before));
                continue;
            }
            let note = note
                .clone()
                .unwrap_or_else(|| entity_note(Action::Updated, &entity_type.label, &next.display));
            let state_only = before.display.name == next.display.name
                && before.display.number == next.display.number
                && before.attrs == next.attrs;
            next.latest = true;
            if state_only
                && !policy.bumps_iteration(
                    before.display.state.as_deref(),
                    next.display.state.as_deref(),
                )
            {
                // No archived row exists for an in-place change.
                next.update_note = Some(note);
                in_place.push(next.clone());
                out.push(Revision::InPlace(next));
                continue;
            }
            let mut row = before;
            row.latest = false;
            row.update_note = Some(note);
            Self::promote(&mut next, row.iteration + 1);
            archived.push(row);
            promoted.push(next.clone());
            out.push(Revision::Advanced(next));
        }
        if !archived.is_empty() {
            self.lookup.archive_insert(cx, &entity_type.table, &archived)?;
            self.lookup.bulk_update(cx, &entity_type.table, &promoted)?;
        }
        if !in_place.is_empty() {
            self.lookup.update_in_place(cx, &entity_type.table, &in_place)?;
        }
        debug!(
            table = %entity_type.table,
            advanced = archived.len(),
            in_place = in_place.len(),
            "ledger.revise"
        );
        Ok(out)
    }

    /// Current row of `id`, if any.
    pub fn current(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        id: &str,
    ) -> Result<Option<EntityRecord>> {
        self.lookup
            .read_one(cx, &cx.schema().entity(ty).table, id)
    }

    /// Every stored row of `id`, ordered by iteration.
    pub fn history(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        id: &str,
    ) -> Result<Vec<EntityRecord>> {
        let mut rows: Vec<EntityRecord> = self.lookup.read_by_foreign_key(
            cx,
            &cx.schema().entity(ty).table,
            ec::ID,
            &[id],
            Alias::History,
            None,
        )?;
        rows.sort_by_key(|row| row.iteration);
        Ok(rows)
    }
}

fn require_initialized(entity: &EntityRecord) -> Result<()> {
    if entity.is_initialized() {
        Ok(())
    } else {
        Err(LedgerError::invariant(format!(
            "entity '{}' advanced before initialization",
            entity.id
        )))
    }
}

fn stale(entity: &EntityRecord, stored: Iteration) -> LedgerError {
    LedgerError::invariant(format!(
        "entity '{}' is stale: caller holds iteration {} but store has {}",
        entity.id, entity.iteration, stored
    ))
}

pub(crate) fn ensure_distinct(ids: &[&str], op: &str) -> Result<()> {
    let mut seen = FxHashSet::default();
    for id in ids {
        if !seen.insert(*id) {
            return Err(LedgerError::invariant(format!(
                "{op}: id '{id}' appears more than once in one batch"
            )));
        }
    }
    Ok(())
}
