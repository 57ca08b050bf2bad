use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::schema::{RelationId, Schema};
use crate::types::{EntityRecord, LedgerError, Result};

/// `isRelationValid(owner, other)` callback registered per relation.
pub type RelationPredicate =
    Arc<dyn Fn(&EntityRecord, Option<&EntityRecord>) -> bool + Send + Sync>;

/// Relation predicates consulted before any interval is opened.
#[derive(Clone, Default)]
pub struct ConstraintRegistry {
    predicates: FxHashMap<RelationId, RelationPredicate>,
}

impl fmt::Debug for ConstraintRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut relations: Vec<_> = self.predicates.keys().collect();
        relations.sort();
        f.debug_struct("ConstraintRegistry")
            .field("relations", &relations)
            .finish()
    }
}

impl ConstraintRegistry {
    /// Registers or replaces the predicate of `relation`.
    pub fn register(&mut self, relation: RelationId, predicate: RelationPredicate) {
        self.predicates.insert(relation, predicate);
    }

    /// Whether `relation` has a predicate.
    pub fn has(&self, relation: RelationId) -> bool {
        self.predicates.contains_key(&relation)
    }

    /// Evaluates the predicate; relations without one accept everything.
    pub fn is_relation_valid(
        &self,
        relation: RelationId,
        owner: &EntityRecord,
        other: Option<&EntityRecord>,
    ) -> bool {
        self.predicates
            .get(&relation)
            .map_or(true, |predicate| predicate(owner, other))
    }

    /// Like [`ConstraintRegistry::is_relation_valid`], but a rejection becomes
    /// a `ConstraintViolation` naming both sides.
    pub fn check(
        &self,
        schema: &Schema,
        relation: RelationId,
        owner: &EntityRecord,
        other: Option<&EntityRecord>,
    ) -> Result<()> {
        if self.is_relation_valid(relation, owner, other) {
            return Ok(());
        }
        let name = &schema.relation(relation).name;
        let other_id = other.map_or_else(|| "<none>".to_string(), |o| format!("'{}'", o.id));
        warn!(relation = %name, owner = %owner.id, other = %other_id, "cascade.constraint_rejected");
        Err(LedgerError::ConstraintViolation {
            relation: name.clone(),
            owner: owner.id.to_string(),
            other: other_id,
        })
    }
}
