//! Batched cascade operations.
//!
//! Reads are grouped (one chunked lookup per table); writes are issued as
//! one statement per kind of row. Elements of one batch that share an owner
//! are coalesced: that owner advances exactly once, every element for it
//! closes at the same pre-bump iteration and opens at the same post-bump
//! iteration, and the per-element notes are joined into the owner's note.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use super::{Closed, DependentChange, Opened, ValidityCascade};
use crate::lookup::chunk::dedup_ids;
use crate::ledger::ensure_distinct;
use crate::note::{join_notes, relation_note, Action};
use crate::schema::{EntityTypeId, Relation, RelationId, RelationKind};
use crate::store::condition::dependent_columns as dc;
use crate::store::rows::Alias;
use crate::store::Session;
use crate::types::{
    DependentId, DependentRecord, DisplayFields, EntityId, EntityRecord, LedgerError,
    NewDependent, Result, INFINITY,
};

type EntityMap = FxHashMap<String, EntityRecord>;

/// Owners touched by a batch, in first-seen order, with their notes.
#[derive(Default)]
struct OwnerGroups {
    order: Vec<String>,
    notes: FxHashMap<String, Vec<String>>,
}

impl OwnerGroups {
    fn add(&mut self, owner: &str, note: String) {
        match self.notes.get_mut(owner) {
            Some(notes) => notes.push(note),
            None => {
                self.order.push(owner.to_string());
                self.notes.insert(owner.to_string(), vec![note]);
            }
        }
    }
}

impl ValidityCascade {
    /// Opens every dependent in `items`, advancing each distinct owner once.
    pub fn create_batch(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        items: Vec<NewDependent>,
    ) -> Result<Vec<Opened>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let schema = cx.schema();
        let rel = schema.relation(relation);
        for item in &items {
            self.lookup().check_id(item.id.as_str())?;
            self.lookup().check_id(item.owner.as_str())?;
            check_shape(rel, item.other.as_ref())?;
        }
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        ensure_distinct(&ids, "create_batch")?;

        let used: Vec<DependentRecord> =
            self.lookup()
                .read_by_foreign_key(cx, &rel.table, dc::ID, &ids, Alias::History, None)?;
        if let Some(row) = used.first() {
            return Err(LedgerError::invariant(format!(
                "dependent '{}' of {} already has history; dependent ids are never reused",
                row.id, rel.name
            )));
        }

        let owners = self.load_strict(cx, rel.owner, items.iter().map(|i| i.owner.as_str()))?;
        let others = match rel.other {
            Some(other_ty) => self.load_strict(
                cx,
                other_ty,
                items.iter().filter_map(|i| i.other.as_ref().map(EntityId::as_str)),
            )?,
            None => EntityMap::default(),
        };
        let pairs: Vec<(&str, &str)> = items
            .iter()
            .filter_map(|i| i.other.as_ref().map(|o| (i.owner.as_str(), o.as_str())))
            .collect();
        self.reject_duplicate_pairs(cx, rel, &pairs, &[])?;

        let other_label = other_label(cx, rel);
        let mut groups = OwnerGroups::default();
        for item in &items {
            let owner = lookup_entry(&owners, item.owner.as_str())?;
            let other = item
                .other
                .as_ref()
                .map(|o| lookup_entry(&others, o.as_str()))
                .transpose()?;
            cx.constraints().check(schema, relation, owner, other)?;
            let note = relation_note(
                Action::Created,
                &rel.label,
                other_label,
                other.map(|o| &o.display),
            );
            groups.add(item.owner.as_str(), note);
        }

        let (promoted, notes) = self.bump_groups(cx, rel.owner, &owners, &groups)?;
        let mut records = Vec::with_capacity(items.len());
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let owner = lookup_entry(&promoted, item.owner.as_str())?;
            let other_display = item
                .other
                .as_ref()
                .map(|o| lookup_entry(&others, o.as_str()).map(|e| e.display.clone()))
                .transpose()?
                .unwrap_or_default();
            let record = DependentRecord {
                id: item.id,
                owner: item.owner,
                other: item.other,
                first_iteration: owner.iteration,
                last_iteration: INFINITY,
                owner_display: owner.display.clone(),
                other_display,
                attrs: item.attrs,
            };
            records.push(record.clone());
            out.push(Opened {
                owner: owner.clone(),
                note: notes.get(owner.id.as_str()).cloned().unwrap_or_default(),
                dependent: record,
            });
        }
        self.lookup().write_intervals(cx, &rel.table, &records)?;
        info!(
            relation = %rel.name,
            dependents = records.len(),
            owners = groups.order.len(),
            "cascade.create_batch"
        );
        Ok(out)
    }

    /// Closes the open interval of each id, advances each distinct owner
    /// once, and opens replacements at the post-bump iteration.
    pub fn replace_or_remove_batch(
        &self,
        cx: &Session<'_>,
        relation: RelationId,
        items: Vec<(DependentId, Option<DependentChange>)>,
    ) -> Result<Vec<Closed>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let schema = cx.schema();
        let rel = schema.relation(relation);
        let ids: Vec<&str> = items.iter().map(|(id, _)| id.as_str()).collect();
        ensure_distinct(&ids, "replace_or_remove_batch")?;
        for (_, change) in &items {
            if let Some(change) = change {
                check_shape(rel, change.other.as_ref())?;
            }
        }

        let current: Vec<DependentRecord> =
            self.lookup()
                .read_many(cx, &rel.table, &rel.name, &ids)?;
        let owners = self.load_owners_tolerant(cx, rel, &current)?;
        let others = match rel.other {
            Some(other_ty) => self.load_strict(
                cx,
                other_ty,
                items
                    .iter()
                    .filter_map(|(_, c)| c.as_ref().and_then(|c| c.other.as_ref()))
                    .map(EntityId::as_str),
            )?,
            None => EntityMap::default(),
        };
        let pairs: Vec<(&str, &str)> = current
            .iter()
            .zip(&items)
            .filter_map(|(row, (_, change))| {
                change
                    .as_ref()
                    .and_then(|c| c.other.as_ref())
                    .map(|o| (row.owner.as_str(), o.as_str()))
            })
            .collect();
        self.reject_duplicate_pairs(cx, rel, &pairs, &ids)?;

        let other_label = other_label(cx, rel);
        let mut groups = OwnerGroups::default();
        let mut closed_rows = Vec::with_capacity(current.len());
        for (row, (_, change)) in current.iter().zip(&items) {
            let owner = lookup_entry(&owners, row.owner.as_str())?;
            let note = match change {
                Some(change) => {
                    let other = change
                        .other
                        .as_ref()
                        .map(|o| lookup_entry(&others, o.as_str()))
                        .transpose()?;
                    cx.constraints().check(schema, relation, owner, other)?;
                    relation_note(
                        Action::Updated,
                        &rel.label,
                        other_label,
                        other.map(|o| &o.display),
                    )
                }
                None => relation_note(
                    Action::Removed,
                    &rel.label,
                    other_label,
                    row.other.as_ref().map(|_| &row.other_display),
                ),
            };
            groups.add(row.owner.as_str(), note);
            let mut closed = row.clone();
            closed.last_iteration = owner.iteration;
            closed_rows.push(closed);
        }

        // Closing first frees the open-interval slot of each id.
        self.lookup()
            .write_intervals(cx, &rel.table, &closed_rows)?;
        let (promoted, notes) = self.bump_groups(cx, rel.owner, &owners, &groups)?;

        let mut opened_rows = Vec::new();
        let mut out = Vec::with_capacity(items.len());
        for (closed, (_, change)) in closed_rows.into_iter().zip(items) {
            let owner = lookup_entry(&promoted, closed.owner.as_str())?;
            let opened = match change {
                Some(change) => {
                    let other_display = change
                        .other
                        .as_ref()
                        .map(|o| lookup_entry(&others, o.as_str()).map(|e| e.display.clone()))
                        .transpose()?
                        .unwrap_or_else(DisplayFields::default);
                    let record = DependentRecord {
                        id: closed.id.clone(),
                        owner: closed.owner.clone(),
                        other: change.other,
                        first_iteration: owner.iteration,
                        last_iteration: INFINITY,
                        owner_display: owner.display.clone(),
                        other_display,
                        attrs: change.attrs,
                    };
                    opened_rows.push(record.clone());
                    Some(record)
                }
                None => None,
            };
            out.push(Closed {
                owner: owner.clone(),
                note: notes.get(owner.id.as_str()).cloned().unwrap_or_default(),
                closed,
                opened,
            });
        }
        self.lookup()
            .write_intervals(cx, &rel.table, &opened_rows)?;
        info!(
            relation = %rel.name,
            closed = out.len(),
            reopened = opened_rows.len(),
            owners = groups.order.len(),
            "cascade.replace_batch"
        );
        Ok(out)
    }

    fn load_strict<'i, I>(&self, cx: &Session<'_>, ty: EntityTypeId, ids: I) -> Result<EntityMap>
    where
        I: IntoIterator<Item = &'i str>,
    {
        let entity_type = cx.schema().entity(ty);
        let ids = dedup_ids(ids);
        let rows: Vec<EntityRecord> =
            self.lookup()
                .read_many(cx, &entity_type.table, &entity_type.name, &ids)?;
        Ok(rows.into_iter().map(|r| (r.id.0.clone(), r)).collect())
    }

    // An owner that is gone is a MissingReference; an owner whose ledger is
    // behind the interval it anchors is corrupt.
    fn load_owners_tolerant(
        &self,
        cx: &Session<'_>,
        rel: &Relation,
        current: &[DependentRecord],
    ) -> Result<EntityMap> {
        let entity_type = cx.schema().entity(rel.owner);
        let ids = dedup_ids(current.iter().map(|row| row.owner.as_str()));
        let slots = self
            .lookup()
            .read_many_tolerant::<EntityRecord>(cx, &entity_type.table, &ids)?;
        let mut owners = EntityMap::default();
        for (slot, id) in slots.into_iter().zip(&ids) {
            match slot {
                Some(owner) => {
                    owners.insert(owner.id.0.clone(), owner);
                }
                None => return Err(LedgerError::missing(&entity_type.name, *id)),
            }
        }
        for row in current {
            let owner = lookup_entry(&owners, row.owner.as_str())?;
            if owner.iteration < row.first_iteration {
                return Err(LedgerError::invariant(format!(
                    "owner '{}' is at iteration {} but anchors interval '{}' opened at {}",
                    owner.id, owner.iteration, row.id, row.first_iteration
                )));
            }
        }
        Ok(owners)
    }

    fn bump_groups(
        &self,
        cx: &Session<'_>,
        owner_ty: EntityTypeId,
        owners: &EntityMap,
        groups: &OwnerGroups,
    ) -> Result<(EntityMap, FxHashMap<String, String>)> {
        let mut rows = Vec::with_capacity(groups.order.len());
        let mut notes = Vec::with_capacity(groups.order.len());
        for id in &groups.order {
            rows.push(lookup_entry(owners, id)?.clone());
            notes.push(
                groups
                    .notes
                    .get(id)
                    .and_then(|n| join_notes(n.iter().map(String::as_str))),
            );
        }
        let promoted = self.ledger.bump_batch(cx, owner_ty, &rows, &notes)?;
        let joined = groups
            .order
            .iter()
            .zip(notes)
            .filter_map(|(id, note)| note.map(|n| (id.clone(), n)))
            .collect();
        Ok((
            promoted.into_iter().map(|r| (r.id.0.clone(), r)).collect(),
            joined,
        ))
    }

    // A link's logical key is its owner and other side, so at most one
    // interval per pair may be open. Symmetric relations are undirected and
    // treat {a, b} and {b, a} as the same pair.
    fn reject_duplicate_pairs(
        &self,
        cx: &Session<'_>,
        rel: &Relation,
        pairs: &[(&str, &str)],
        replacing: &[&str],
    ) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let symmetric = rel.kind.is_symmetric();
        let key = |a: &str, b: &str| -> (String, String) {
            let (a, b) = if symmetric { unordered(a, b) } else { (a, b) };
            (a.to_string(), b.to_string())
        };
        let mut wanted: FxHashSet<(String, String)> = FxHashSet::default();
        for (a, b) in pairs {
            if !wanted.insert(key(a, b)) {
                return Err(LedgerError::invariant(format!(
                    "{}: '{a}' and '{b}' are related twice in one batch",
                    rel.name
                )));
            }
        }
        let (endpoints, columns): (Vec<&str>, &[&'static str]) = if symmetric {
            (
                dedup_ids(pairs.iter().flat_map(|(a, b)| [*a, *b])),
                &[dc::OWNER_ID, dc::OTHER_ID],
            )
        } else {
            (dedup_ids(pairs.iter().map(|(a, _)| *a)), &[dc::OWNER_ID])
        };
        let replacing: FxHashSet<&str> = replacing.iter().copied().collect();
        for &column in columns {
            let rows: Vec<DependentRecord> = self.lookup().read_by_foreign_key(
                cx,
                &rel.table,
                column,
                &endpoints,
                Alias::Current,
                None,
            )?;
            for row in rows {
                if replacing.contains(row.id.as_str()) {
                    continue;
                }
                let Some(other) = row.other.as_ref() else {
                    continue;
                };
                if wanted.contains(&key(row.owner.as_str(), other.as_str())) {
                    return Err(LedgerError::invariant(format!(
                        "{}: '{}' and '{}' are already related by '{}'",
                        rel.name, row.owner, other, row.id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn unordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn check_shape(rel: &Relation, other: Option<&EntityId>) -> Result<()> {
    match (rel.kind, other) {
        (RelationKind::Child, Some(other)) => Err(LedgerError::invariant(format!(
            "{} holds owned children and cannot point at '{other}'",
            rel.name
        ))),
        (RelationKind::Link | RelationKind::SelfLink(_), None) => Err(LedgerError::invariant(
            format!("{} requires an other side", rel.name),
        )),
        _ => Ok(()),
    }
}

fn other_label<'a>(cx: &Session<'a>, rel: &Relation) -> Option<&'a str> {
    rel.other.map(|ty| cx.schema().entity(ty).label.as_str())
}

fn lookup_entry<'m>(map: &'m EntityMap, id: &str) -> Result<&'m EntityRecord> {
    map.get(id)
        .ok_or_else(|| LedgerError::invariant(format!("entity '{id}' was not loaded")))
}
