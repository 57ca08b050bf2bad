//! Mapping between stored rows and record types.

use rusqlite::Row as SqlRow;
use serde_json::Value as Json;

use super::condition::{dependent_columns as dc, entity_columns as ec, Condition};
use crate::types::{
    DependentId, DependentRecord, DisplayFields, EntityId, EntityRecord, INFINITY,
};

/// Visibility context of a lookup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Alias {
    /// Only rows currently in effect.
    Current,
    /// Every stored row, archived and closed ones included.
    History,
}

/// A record type that can be loaded through the lookup service.
pub trait StoredRow: Sized {
    /// Column list in the order [`StoredRow::from_row`] expects.
    const COLUMNS: &'static str;
    /// Column holding the logical id.
    const KEY: &'static str;
    /// What this row is called in `MissingReference` errors when no better
    /// name is known.
    const KIND: &'static str;

    /// Decodes one row.
    fn from_row(row: &SqlRow<'_>) -> rusqlite::Result<Self>;

    /// Condition every lookup against this row type ANDs in.
    fn universal_condition(alias: Alias) -> Option<Condition>;

    /// Logical id of the row.
    fn key(&self) -> &str;
}

pub(crate) const ENTITY_COLUMNS: &str =
    "id, iteration, latest, update_note, name, number, state, attrs";

pub(crate) const DEPENDENT_COLUMNS: &str = "id, owner_id, other_id, first_iteration, \
     last_iteration, owner_name, owner_number, owner_state, other_name, other_number, \
     other_state, attrs";

impl StoredRow for EntityRecord {
    const COLUMNS: &'static str = ENTITY_COLUMNS;
    const KEY: &'static str = ec::ID;
    const KIND: &'static str = "entity";

    fn from_row(row: &SqlRow<'_>) -> rusqlite::Result<Self> {
        Ok(EntityRecord {
            id: EntityId(row.get(0)?),
            iteration: row.get(1)?,
            latest: row.get(2)?,
            update_note: row.get(3)?,
            display: DisplayFields {
                name: row.get(4)?,
                number: row.get(5)?,
                state: row.get(6)?,
            },
            attrs: decode_attrs(row, 7)?,
        })
    }

    fn universal_condition(alias: Alias) -> Option<Condition> {
        match alias {
            Alias::Current => Some(Condition::eq(ec::LATEST, true)),
            Alias::History => None,
        }
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl StoredRow for DependentRecord {
    const COLUMNS: &'static str = DEPENDENT_COLUMNS;
    const KEY: &'static str = dc::ID;
    const KIND: &'static str = "dependent";

    fn from_row(row: &SqlRow<'_>) -> rusqlite::Result<Self> {
        let other: Option<String> = row.get(2)?;
        Ok(DependentRecord {
            id: DependentId(row.get(0)?),
            owner: EntityId(row.get(1)?),
            other: other.map(EntityId),
            first_iteration: row.get(3)?,
            last_iteration: row.get(4)?,
            owner_display: DisplayFields {
                name: row.get(5)?,
                number: row.get(6)?,
                state: row.get(7)?,
            },
            other_display: DisplayFields {
                name: row.get(8)?,
                number: row.get(9)?,
                state: row.get(10)?,
            },
            attrs: decode_attrs(row, 11)?,
        })
    }

    fn universal_condition(alias: Alias) -> Option<Condition> {
        match alias {
            Alias::Current => Some(Condition::eq(dc::LAST_ITERATION, INFINITY)),
            Alias::History => None,
        }
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

fn decode_attrs(row: &SqlRow<'_>, idx: usize) -> rusqlite::Result<Json> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(Json::Null),
        Some(text) => serde_json::from_str(&text).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        }),
    }
}

pub(crate) fn encode_attrs(attrs: &Json) -> serde_json::Result<Option<String>> {
    if attrs.is_null() {
        Ok(None)
    } else {
        serde_json::to_string(attrs).map(Some)
    }
}
