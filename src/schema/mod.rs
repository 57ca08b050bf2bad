//! Entity types and relations, resolved once into index handles.
//!
//! Names are looked up only while building the schema (from code or from a
//! [`SchemaConfig`]). Every runtime path carries an [`EntityTypeId`] or a
//! [`RelationId`], which are plain indexes into the schema's arenas.

use std::collections::HashMap;

use crate::config::{RelationKindConfig, SchemaConfig};
use crate::types::{LedgerError, Result};

/// Handle of an entity type inside a [`Schema`]. Only the schema builder
/// issues handles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(pub(crate) u32);

/// Handle of a relation inside a [`Schema`]. Only the schema builder issues
/// handles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub(crate) u32);

/// How a self-link treats its two sides.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Left and right mean different things.
    Directed,
    /// Undirected; stored orientation is arbitrary and normalized on read.
    Symmetric,
}

/// Shape of a relation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Owner type to a different entity type.
    Link,
    /// Owner type to itself.
    SelfLink(Orientation),
    /// Owned child rows with no other side.
    Child,
}

impl RelationKind {
    /// Whether rows of this relation reference another entity.
    pub fn has_other_side(self) -> bool {
        !matches!(self, RelationKind::Child)
    }

    /// Whether this is an undirected self-link.
    pub fn is_symmetric(self) -> bool {
        matches!(self, RelationKind::SelfLink(Orientation::Symmetric))
    }
}

/// An iterated entity type.
#[derive(Clone, Debug)]
pub struct EntityType {
    /// Schema name, also the table suffix.
    pub name: String,
    /// Label used in update notes.
    pub label: String,
    /// Backing table.
    pub table: String,
}

/// A validity-tagged relation anchored on an owner type.
#[derive(Clone, Debug)]
pub struct Relation {
    /// Schema name, also the table suffix.
    pub name: String,
    /// Label used in update notes.
    pub label: String,
    /// Backing table.
    pub table: String,
    /// Shape.
    pub kind: RelationKind,
    /// Type whose ledger anchors the validity windows.
    pub owner: EntityTypeId,
    /// Type of the other side, if any.
    pub other: Option<EntityTypeId>,
}

/// Immutable set of entity types and relations.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    entities: Vec<EntityType>,
    relations: Vec<Relation>,
    entity_names: HashMap<String, EntityTypeId>,
    relation_names: HashMap<String, RelationId>,
}

impl Schema {
    /// Starts an empty builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Builds a schema from its TOML description.
    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        let mut builder = Schema::builder();
        for entity in &config.entities {
            let label = entity.label.as_deref().unwrap_or(&entity.name);
            builder.entity(&entity.name, label)?;
        }
        for relation in &config.relations {
            let owner = builder.resolve_entity(&relation.owner)?;
            let label = relation.label.as_deref().unwrap_or(&relation.name);
            match relation.kind {
                RelationKindConfig::Link => {
                    let other_name = relation.other.as_deref().ok_or_else(|| {
                        LedgerError::Schema(format!("link '{}' needs an other type", relation.name))
                    })?;
                    let other = builder.resolve_entity(other_name)?;
                    builder.link(&relation.name, label, owner, other)?;
                }
                RelationKindConfig::SelfLink => {
                    let orientation = if relation.symmetric {
                        Orientation::Symmetric
                    } else {
                        Orientation::Directed
                    };
                    builder.self_link(&relation.name, label, owner, orientation)?;
                }
                RelationKindConfig::Child => {
                    builder.child(&relation.name, label, owner)?;
                }
            }
        }
        Ok(builder.build())
    }

    /// Entity type behind a handle.
    ///
    /// # Panics
    ///
    /// If `id` was issued by a different, larger schema. Use
    /// [`Schema::get_entity`] for handles of unknown origin.
    pub fn entity(&self, id: EntityTypeId) -> &EntityType {
        &self.entities[id.0 as usize]
    }

    /// Relation behind a handle.
    ///
    /// # Panics
    ///
    /// If `id` was issued by a different, larger schema. Use
    /// [`Schema::get_relation`] for handles of unknown origin.
    pub fn relation(&self, id: RelationId) -> &Relation {
        &self.relations[id.0 as usize]
    }

    /// Entity type behind a handle, or `None` if this schema never issued it.
    pub fn get_entity(&self, id: EntityTypeId) -> Option<&EntityType> {
        self.entities.get(id.0 as usize)
    }

    /// Relation behind a handle, or `None` if this schema never issued it.
    pub fn get_relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.0 as usize)
    }

    /// Resolves an entity type name.
    pub fn entity_type(&self, name: &str) -> Option<EntityTypeId> {
        self.entity_names.get(name).copied()
    }

    /// Resolves a relation name.
    pub fn relation_named(&self, name: &str) -> Option<RelationId> {
        self.relation_names.get(name).copied()
    }

    /// All entity type handles in declaration order.
    pub fn entity_types(&self) -> impl Iterator<Item = EntityTypeId> + '_ {
        (0..self.entities.len() as u32).map(EntityTypeId)
    }

    /// All relation handles in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = RelationId> + '_ {
        (0..self.relations.len() as u32).map(RelationId)
    }

    /// Relations whose windows are anchored on `owner`.
    pub fn relations_owned_by(&self, owner: EntityTypeId) -> impl Iterator<Item = RelationId> + '_ {
        self.relations()
            .filter(move |rel| self.relation(*rel).owner == owner)
    }

    /// Entity type of the other side of `relation`.
    pub fn other_type(&self, relation: RelationId) -> Option<EntityTypeId> {
        self.relation(relation).other
    }
}

/// Accumulates types and relations, validating names as it goes.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Declares an iterated entity type.
    pub fn entity(&mut self, name: &str, label: &str) -> Result<EntityTypeId> {
        check_name(name)?;
        if self.schema.entity_names.contains_key(name) {
            return Err(LedgerError::Schema(format!(
                "entity type '{name}' declared twice"
            )));
        }
        let id = EntityTypeId(self.schema.entities.len() as u32);
        self.schema.entities.push(EntityType {
            name: name.to_string(),
            label: label.to_string(),
            table: format!("ent_{name}"),
        });
        self.schema.entity_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declares a link from `owner` to a different type `other`.
    pub fn link(
        &mut self,
        name: &str,
        label: &str,
        owner: EntityTypeId,
        other: EntityTypeId,
    ) -> Result<RelationId> {
        self.push_relation(name, label, RelationKind::Link, owner, Some(other))
    }

    /// Declares a self-link on `owner`.
    pub fn self_link(
        &mut self,
        name: &str,
        label: &str,
        owner: EntityTypeId,
        orientation: Orientation,
    ) -> Result<RelationId> {
        self.push_relation(
            name,
            label,
            RelationKind::SelfLink(orientation),
            owner,
            Some(owner),
        )
    }

    /// Declares owned child rows on `owner`.
    pub fn child(&mut self, name: &str, label: &str, owner: EntityTypeId) -> Result<RelationId> {
        self.push_relation(name, label, RelationKind::Child, owner, None)
    }

    /// Finishes the schema.
    pub fn build(self) -> Schema {
        self.schema
    }

    fn resolve_entity(&self, name: &str) -> Result<EntityTypeId> {
        self.schema
            .entity_type(name)
            .ok_or_else(|| LedgerError::Schema(format!("unknown entity type '{name}'")))
    }

    fn push_relation(
        &mut self,
        name: &str,
        label: &str,
        kind: RelationKind,
        owner: EntityTypeId,
        other: Option<EntityTypeId>,
    ) -> Result<RelationId> {
        check_name(name)?;
        if self.schema.relation_names.contains_key(name) {
            return Err(LedgerError::Schema(format!(
                "relation '{name}' declared twice"
            )));
        }
        let known = self.schema.entities.len() as u32;
        if owner.0 >= known || other.is_some_and(|o| o.0 >= known) {
            return Err(LedgerError::Schema(format!(
                "relation '{name}' references an undeclared entity type"
            )));
        }
        if kind == RelationKind::Link && other == Some(owner) {
            return Err(LedgerError::Schema(format!(
                "link '{name}' points at its owner type; declare a self-link instead"
            )));
        }
        let id = RelationId(self.schema.relations.len() as u32);
        self.schema.relations.push(Relation {
            name: name.to_string(),
            label: label.to_string(),
            table: format!("rel_{name}"),
            kind,
            owner,
            other,
        });
        self.schema.relation_names.insert(name.to_string(), id);
        Ok(id)
    }
}

// Names become SQL identifiers.
fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::Schema(format!(
            "name '{name}' must match [a-z][a-z0-9_]*"
        )))
    }
}
