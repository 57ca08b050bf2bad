//! Batched lookup and bulk-write primitives.
//!
//! Reads resolve identifiers in fixed-size chunks. Each chunk becomes one
//! statement whose key condition is an OR of equalities, padded with the
//! sentinel id so that every chunk statement has the same shape and the
//! prepared-statement cache holds a single plan per table and column.
//!
//! Every read composes, in this order:
//! `(key OR-chunk) AND (universal condition of the row type) AND (filter)`.
//!
//! Writes are multi-row statements; the order of input rows is preserved.

pub mod chunk;
mod metrics;

use std::sync::Arc;

use rusqlite::types::Value;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::LedgerOptions;
use crate::store::condition::{Condition, SqlValue};
use crate::store::rows::{encode_attrs, Alias, StoredRow, DEPENDENT_COLUMNS, ENTITY_COLUMNS};
use crate::store::Session;
use crate::types::{DependentRecord, EntityRecord, LedgerError, Result};

pub use metrics::{default_metrics, CounterMetrics, LookupMetrics, NoopMetrics};

use chunk::{dedup_ids, padded_chunks};

const ENTITY_ARITY: usize = 8;
const DEPENDENT_ARITY: usize = 12;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum WriteMode {
    /// Plain insert; a clash on `(id, iteration)` is a storage error.
    Insert,
    /// Flips the live row to archived and records its note.
    Archive,
    /// Rewrites the live row at its own iteration.
    InPlace,
}

/// Stateless lookup service; cheap to clone.
#[derive(Clone)]
pub struct LookupService {
    chunk_size: usize,
    sentinel: Arc<str>,
    write_batch_rows: usize,
    metrics: Arc<dyn LookupMetrics>,
}

impl LookupService {
    /// Builds the service from store options.
    pub fn new(options: &LedgerOptions) -> Self {
        Self {
            chunk_size: options.chunk_size.max(1),
            sentinel: options.sentinel_id.clone(),
            write_batch_rows: options.write_batch_rows.max(1),
            metrics: options.metrics.clone().unwrap_or_else(default_metrics),
        }
    }

    /// Ids per chunk query.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Padding sentinel.
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Rejects ids that could never be stored.
    pub fn check_id(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(LedgerError::invariant("identifiers must not be empty"));
        }
        if id == &*self.sentinel {
            return Err(LedgerError::invariant(format!(
                "'{id}' is reserved as the lookup padding sentinel"
            )));
        }
        Ok(())
    }

    /// Loads the current row for `id`, if any.
    pub fn read_one<R: StoredRow>(
        &self,
        cx: &Session<'_>,
        table: &str,
        id: &str,
    ) -> Result<Option<R>> {
        let mut rows = self.select::<R>(cx, table, R::KEY, &[id], Alias::Current, None)?;
        if rows.len() > 1 {
            return Err(LedgerError::invariant(format!(
                "{} rows resolved for unique id '{id}' in {table}",
                rows.len()
            )));
        }
        Ok(rows.pop())
    }

    /// Loads the current row for every id, in input order. Any unresolved id
    /// is a `MissingReference` naming `kind`.
    pub fn read_many<R: StoredRow + Clone>(
        &self,
        cx: &Session<'_>,
        table: &str,
        kind: &str,
        ids: &[&str],
    ) -> Result<Vec<R>> {
        let slots = self.read_many_tolerant::<R>(cx, table, ids)?;
        slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| slot.ok_or_else(|| LedgerError::missing(kind, *id)))
            .collect()
    }

    /// Like [`LookupService::read_many`], but unresolved ids yield `None`.
    pub fn read_many_tolerant<R: StoredRow + Clone>(
        &self,
        cx: &Session<'_>,
        table: &str,
        ids: &[&str],
    ) -> Result<Vec<Option<R>>> {
        let rows = self.select::<R>(cx, table, R::KEY, ids, Alias::Current, None)?;
        let mut by_key: FxHashMap<String, R> = FxHashMap::default();
        by_key.reserve(rows.len());
        for row in rows {
            let key = row.key().to_string();
            if by_key.insert(key.clone(), row).is_some() {
                return Err(LedgerError::invariant(format!(
                    "more than one current row resolved for id '{key}' in {table}"
                )));
            }
        }
        Ok(ids.iter().map(|id| by_key.get(*id).cloned()).collect())
    }

    /// Loads rows whose `column` matches any of `ids`.
    pub fn read_by_foreign_key<R: StoredRow>(
        &self,
        cx: &Session<'_>,
        table: &str,
        column: &'static str,
        ids: &[&str],
        alias: Alias,
        filter: Option<&Condition>,
    ) -> Result<Vec<R>> {
        self.select(cx, table, column, ids, alias, filter)
    }

    /// Loads every row visible under `alias` that matches `filter`.
    pub fn scan<R: StoredRow>(
        &self,
        cx: &Session<'_>,
        table: &str,
        alias: Alias,
        filter: Option<&Condition>,
    ) -> Result<Vec<R>> {
        let mut cond = Condition::And(Vec::new());
        if let Some(universal) = R::universal_condition(alias) {
            cond = cond.and(universal);
        }
        if let Some(extra) = filter {
            cond = cond.and(extra.clone());
        }
        self.run_select(cx, table, &cond)
    }

    fn select<R: StoredRow>(
        &self,
        cx: &Session<'_>,
        table: &str,
        column: &'static str,
        ids: &[&str],
        alias: Alias,
        filter: Option<&Condition>,
    ) -> Result<Vec<R>> {
        let distinct = dedup_ids(ids.iter().copied());
        let mut out = Vec::with_capacity(distinct.len());
        for chunk in padded_chunks(&distinct, self.chunk_size, &self.sentinel) {
            let keys = Condition::Or(
                chunk
                    .iter()
                    .map(|id| Condition::eq(column, *id))
                    .collect(),
            );
            let mut cond = Condition::And(vec![keys]);
            if let Some(universal) = R::universal_condition(alias) {
                cond = cond.and(universal);
            }
            if let Some(extra) = filter {
                cond = cond.and(extra.clone());
            }
            out.extend(self.run_select::<R>(cx, table, &cond)?);
            self.metrics.chunk_query(table);
            debug!(table, column, ids = chunk.len(), "lookup.chunk_query");
        }
        Ok(out)
    }

    fn run_select<R: StoredRow>(
        &self,
        cx: &Session<'_>,
        table: &str,
        cond: &Condition,
    ) -> Result<Vec<R>> {
        let mut sql = format!("SELECT {} FROM {table} WHERE ", R::COLUMNS);
        let mut params: Vec<SqlValue> = Vec::new();
        cond.render(&mut sql, &mut params);
        let mut stmt = cx.conn().prepare_cached(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), R::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Inserts freshly initialized entity rows. A clash on `(id, iteration)`
    /// or on the latest-row index surfaces as a storage error.
    pub fn insert_entities(
        &self,
        cx: &Session<'_>,
        table: &str,
        rows: &[EntityRecord],
    ) -> Result<()> {
        for batch in rows.chunks(self.write_batch_rows) {
            self.write_entity_rows(cx, table, batch, WriteMode::Insert)?;
            self.metrics.bulk_update(batch.len());
        }
        Ok(())
    }

    /// Archives the live rows named by `rows` (`latest = false`) and stores
    /// each row's `update_note` on them.
    ///
    /// Only the latest flag and the note change; the stored content of an
    /// archived row is never rewritten. A row whose `(id, iteration)` is not
    /// the live one fails the whole call.
    pub fn archive_insert(
        &self,
        cx: &Session<'_>,
        table: &str,
        rows: &[EntityRecord],
    ) -> Result<()> {
        for batch in rows.chunks(self.write_batch_rows) {
            self.write_entity_rows(cx, table, batch, WriteMode::Archive)?;
            self.metrics.archive_insert(batch.len());
            debug!(table, rows = batch.len(), "lookup.archive_insert");
        }
        Ok(())
    }

    /// Inserts promoted rows at their new iteration.
    ///
    /// Promotion never overwrites: an existing `(id, iteration)` row is a
    /// storage error, so history cannot be rewritten through this path.
    pub fn bulk_update(&self, cx: &Session<'_>, table: &str, rows: &[EntityRecord]) -> Result<()> {
        for batch in rows.chunks(self.write_batch_rows) {
            self.write_entity_rows(cx, table, batch, WriteMode::Insert)?;
            self.metrics.bulk_update(batch.len());
            debug!(table, rows = batch.len(), "lookup.bulk_update");
        }
        Ok(())
    }

    /// Rewrites live rows without changing their iteration. Archived rows
    /// are left alone and fail the call.
    pub fn update_in_place(
        &self,
        cx: &Session<'_>,
        table: &str,
        rows: &[EntityRecord],
    ) -> Result<()> {
        for batch in rows.chunks(self.write_batch_rows) {
            self.write_entity_rows(cx, table, batch, WriteMode::InPlace)?;
            self.metrics.bulk_update(batch.len());
            debug!(table, rows = batch.len(), "lookup.update_in_place");
        }
        Ok(())
    }

    /// Writes dependent intervals keyed by `(id, first_iteration)`; existing
    /// intervals take the new `last_iteration` (closing them).
    pub fn write_intervals(
        &self,
        cx: &Session<'_>,
        table: &str,
        rows: &[DependentRecord],
    ) -> Result<()> {
        for batch in rows.chunks(self.write_batch_rows) {
            let mut sql = format!("INSERT INTO {table} ({DEPENDENT_COLUMNS}) VALUES ");
            push_placeholders(&mut sql, batch.len(), DEPENDENT_ARITY);
            sql.push_str(
                " ON CONFLICT(id, first_iteration) DO UPDATE SET \
                 last_iteration = excluded.last_iteration",
            );
            let mut params: Vec<Value> = Vec::with_capacity(batch.len() * DEPENDENT_ARITY);
            for row in batch {
                params.push(Value::Text(row.id.0.clone()));
                params.push(Value::Text(row.owner.0.clone()));
                params.push(opt_text(row.other.as_ref().map(|o| o.0.as_str())));
                params.push(Value::Integer(row.first_iteration));
                params.push(Value::Integer(row.last_iteration));
                params.push(opt_text(row.owner_display.name.as_deref()));
                params.push(opt_text(row.owner_display.number.as_deref()));
                params.push(opt_text(row.owner_display.state.as_deref()));
                params.push(opt_text(row.other_display.name.as_deref()));
                params.push(opt_text(row.other_display.number.as_deref()));
                params.push(opt_text(row.other_display.state.as_deref()));
                params.push(opt_text(encode_attrs(&row.attrs)?.as_deref()));
            }
            let mut stmt = cx.conn().prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(params))?;
            self.metrics.dependent_write(batch.len());
            debug!(table, rows = batch.len(), "lookup.write_intervals");
        }
        Ok(())
    }

    fn write_entity_rows(
        &self,
        cx: &Session<'_>,
        table: &str,
        rows: &[EntityRecord],
        mode: WriteMode,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut sql = format!("INSERT INTO {table} ({ENTITY_COLUMNS}) VALUES ");
        push_placeholders(&mut sql, rows.len(), ENTITY_ARITY);
        match mode {
            WriteMode::Insert => {}
            WriteMode::Archive => sql.push_str(
                " ON CONFLICT(id, iteration) DO UPDATE SET latest = 0, \
                 update_note = excluded.update_note WHERE latest = 1",
            ),
            WriteMode::InPlace => sql.push_str(
                " ON CONFLICT(id, iteration) DO UPDATE SET \
                 update_note = excluded.update_note, name = excluded.name, \
                 number = excluded.number, state = excluded.state, attrs = excluded.attrs \
                 WHERE latest = 1",
            ),
        }
        let mut params: Vec<Value> = Vec::with_capacity(rows.len() * ENTITY_ARITY);
        for row in rows {
            let latest = match mode {
                WriteMode::Archive => false,
                WriteMode::Insert | WriteMode::InPlace => row.latest,
            };
            params.push(Value::Text(row.id.0.clone()));
            params.push(Value::Integer(row.iteration));
            params.push(Value::Integer(i64::from(latest)));
            params.push(opt_text(row.update_note.as_deref()));
            params.push(opt_text(row.display.name.as_deref()));
            params.push(opt_text(row.display.number.as_deref()));
            params.push(opt_text(row.display.state.as_deref()));
            params.push(opt_text(encode_attrs(&row.attrs)?.as_deref()));
        }
        let mut stmt = cx.conn().prepare_cached(&sql)?;
        let changed = stmt.execute(rusqlite::params_from_iter(params))?;
        // A skipped DO UPDATE means the key held an archived row.
        if changed != rows.len() {
            return Err(LedgerError::invariant(format!(
                "{table}: {} of {} rows were not live and were left untouched",
                rows.len() - changed,
                rows.len()
            )));
        }
        Ok(())
    }
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

fn push_placeholders(sql: &mut String, rows: usize, arity: usize) {
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..arity {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
        }
        sql.push(')');
    }
}
