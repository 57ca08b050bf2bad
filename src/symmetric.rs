//! Symmetric self-relations stored once, read from both sides.
//!
//! A symmetric row is stored with its owner on the left. Reading the
//! neighbours of `x` unions the rows where `x` is the owner with the rows
//! where `x` is the other side; rows from the second half are mirrored so
//! that `x` always appears as the owner of the returned view.

use std::collections::BTreeMap;

use crate::lookup::chunk::dedup_ids;
use crate::lookup::LookupService;
use crate::schema::RelationId;
use crate::store::condition::dependent_columns as dc;
use crate::store::rows::Alias;
use crate::store::Session;
use crate::types::{DependentRecord, EntityId, LedgerError, Result};

/// A relation row as seen from one endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetricView {
    /// The row with the viewing endpoint as owner.
    pub record: DependentRecord,
    /// `true` when the stored row had the viewing endpoint on the other side.
    pub mirrored: bool,
}

impl SymmetricView {
    /// The endpoint opposite the viewer.
    pub fn other_side(&self) -> Option<&EntityId> {
        self.record.other.as_ref()
    }
}

/// Reads symmetric self-links from either endpoint.
#[derive(Clone)]
pub struct SymmetricAdapter {
    lookup: LookupService,
}

impl SymmetricAdapter {
    /// Creates the adapter.
    pub fn new(lookup: LookupService) -> Self {
        Self { lookup }
    }

    /// Open relations touching `entity`, from its point of view.
    ///
    /// A self-loop (`x` related to `x`) appears once.
    pub fn dependents_of(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        entity: &EntityId,
    ) -> Result<Vec<SymmetricView>> {
        let mut grouped = self.dependents_of_many(cx, relation, &[entity.as_str()])?;
        Ok(grouped.remove(entity.as_str()).unwrap_or_default())
    }

    /// Batch form of [`SymmetricAdapter::dependents_of`]: two chunked
    /// lookups regardless of how many endpoints are asked for.
    pub fn dependents_of_many(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        entities: &[&str],
    ) -> Result<BTreeMap<String, Vec<SymmetricView>>> {
        let rel = cx.schema().relation(relation);
        if !rel.kind.is_symmetric() {
            return Err(LedgerError::invariant(format!(
                "{} is not a symmetric relation",
                rel.name
            )));
        }
        let ids = dedup_ids(entities.iter().copied());
        let mut out: BTreeMap<String, Vec<SymmetricView>> = BTreeMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        let direct: Vec<DependentRecord> = self.lookup.read_by_foreign_key(
            cx,
            &rel.table,
            dc::OWNER_ID,
            &ids,
            Alias::Current,
            None,
        )?;
        for record in direct {
            out.entry(record.owner.0.clone())
                .or_default()
                .push(SymmetricView {
                    record,
                    mirrored: false,
                });
        }

        let reverse: Vec<DependentRecord> = self.lookup.read_by_foreign_key(
            cx,
            &rel.table,
            dc::OTHER_ID,
            &ids,
            Alias::Current,
            None,
        )?;
        for record in reverse {
            // already returned by the owner-side lookup
            if record.other.as_ref() == Some(&record.owner) {
                continue;
            }
            let record = record.mirrored();
            out.entry(record.owner.0.clone())
                .or_default()
                .push(SymmetricView {
                    record,
                    mirrored: true,
                });
        }
        for views in out.values_mut() {
            views.sort_by(|a, b| a.record.id.as_str().cmp(b.record.id.as_str()));
        }
        Ok(out)
    }
}
