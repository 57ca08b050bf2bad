//! Point-in-time reads over the ledger and the interval tables.

use serde::Serialize;

use crate::lookup::LookupService;
use crate::schema::{EntityTypeId, RelationId};
use crate::store::condition::{dependent_columns as dc, entity_columns as ec, Condition};
use crate::store::rows::Alias;
use crate::store::Session;
use crate::types::{DependentRecord, EntityId, EntityRecord, Iteration, Result};

/// An owner at one iteration together with everything in effect then.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// The entity row at the requested iteration.
    pub entity: EntityRecord,
    /// Dependents in effect at that iteration, per relation name.
    pub dependents: Vec<(String, Vec<DependentRecord>)>,
}

/// Reads past states.
#[derive(Clone)]
pub struct HistoryReader {
    lookup: LookupService,
}

impl HistoryReader {
    /// Creates the reader.
    pub fn new(lookup: LookupService) -> Self {
        Self { lookup }
    }

    /// The row `(id, k)`, archived or not.
    pub fn entity_at(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        id: &EntityId,
        k: Iteration,
    ) -> Result<Option<EntityRecord>> {
        let filter = Condition::eq(ec::ITERATION, k);
        let mut rows: Vec<EntityRecord> = self.lookup.read_by_foreign_key(
            cx,
            &cx.schema().entity(ty).table,
            ec::ID,
            &[id.as_str()],
            Alias::History,
            Some(&filter),
        )?;
        Ok(rows.pop())
    }

    /// Dependents of `owner` whose window contains `k`.
    ///
    /// Windows are counted in the owning side's iterations, so only rows
    /// stored with `owner` as owner are returned. For symmetric relations
    /// this leaves out rows stored with `owner` on the other side: its own
    /// ledger never advanced for them, and `k` says nothing about their
    /// window. Current mirrored rows come from
    /// [`crate::symmetric::SymmetricAdapter`].
    pub fn dependents_at(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        owner: &EntityId,
        k: Iteration,
    ) -> Result<Vec<DependentRecord>> {
        let filter = in_effect_at(k);
        let mut rows: Vec<DependentRecord> = self.lookup.read_by_foreign_key(
            cx,
            &cx.schema().relation(relation).table,
            dc::OWNER_ID,
            &[owner.as_str()],
            Alias::History,
            Some(&filter),
        )?;
        rows.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(rows)
    }

    /// The entity at `k` and its dependents in every relation it owns, or
    /// `None` if the entity never reached iteration `k`.
    pub fn snapshot_at(
        &self,
        cx: &Session<'_>,
        ty: EntityTypeId,
        id: &EntityId,
        k: Iteration,
    ) -> Result<Option<Snapshot>> {
        let Some(entity) = self.entity_at(cx, ty, id, k)? else {
            return Ok(None);
        };
        let schema = cx.schema();
        let mut dependents = Vec::new();
        for relation in schema.relations_owned_by(ty) {
            let rows = self.dependents_at(cx, relation, id, k)?;
            dependents.push((schema.relation(relation).name.clone(), rows));
        }
        Ok(Some(Snapshot { entity, dependents }))
    }
}

fn in_effect_at(k: Iteration) -> Condition {
    Condition::le(dc::FIRST_ITERATION, k).and(Condition::ge(dc::LAST_ITERATION, k))
}
