#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{open_catalog_with, seed};
use itergraph::store::condition::{entity_columns as ec, Condition};
use itergraph::store::rows::Alias;
use itergraph::{CounterMetrics, EntityRecord, ErrorKind, LedgerError, LedgerOptions, Result};

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("p{i:03}")).collect()
}

fn seed_parts(store: &mut itergraph::Store, part: itergraph::EntityTypeId, n: usize) -> Result<()> {
    let ids = ids(n);
    let pairs: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), id.as_str())).collect();
    seed(store, part, &pairs)?;
    Ok(())
}

#[test]
fn forty_five_ids_take_three_chunk_queries() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let (mut store, cat) = open_catalog_with(LedgerOptions::default().metrics(metrics.clone()))?;
    seed_parts(&mut store, cat.part, 45)?;
    let table = store.schema().entity(cat.part).table.clone();
    let lookup = store.lookup();
    let wanted = ids(45);
    let wanted: Vec<&str> = wanted.iter().map(String::as_str).collect();

    metrics.reset();
    let rows = store.transaction(|cx| lookup.read_many::<EntityRecord>(cx, &table, "part", &wanted))?;
    assert_eq!(metrics.chunk_queries(), 3);
    assert_eq!(rows.len(), 45);
    assert!(rows.iter().zip(&wanted).all(|(row, id)| row.id.as_str() == *id));

    metrics.reset();
    let none = store.transaction(|cx| lookup.read_many::<EntityRecord>(cx, &table, "part", &[]))?;
    assert!(none.is_empty());
    assert_eq!(metrics.chunk_queries(), 0);
    Ok(())
}

#[test]
fn duplicate_ids_are_queried_once_and_answered_in_place() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let (mut store, cat) = open_catalog_with(LedgerOptions::default().metrics(metrics.clone()))?;
    seed_parts(&mut store, cat.part, 3)?;
    let table = store.schema().entity(cat.part).table.clone();
    let lookup = store.lookup();

    let wanted: Vec<&str> = std::iter::repeat(["p000", "p001", "p002"])
        .take(10)
        .flatten()
        .collect();
    metrics.reset();
    let rows = store.transaction(|cx| lookup.read_many::<EntityRecord>(cx, &table, "part", &wanted))?;
    assert_eq!(metrics.chunk_queries(), 1);
    assert_eq!(rows.len(), 30);
    assert_eq!(rows[3].id.as_str(), "p000");
    Ok(())
}

#[test]
fn configured_chunk_size_is_honoured() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let options = LedgerOptions::default()
        .chunk_size(7)
        .metrics(metrics.clone());
    let (mut store, cat) = open_catalog_with(options)?;
    seed_parts(&mut store, cat.part, 15)?;
    let table = store.schema().entity(cat.part).table.clone();
    let lookup = store.lookup();
    assert_eq!(lookup.chunk_size(), 7);

    let wanted = ids(15);
    let wanted: Vec<&str> = wanted.iter().map(String::as_str).collect();
    metrics.reset();
    store.transaction(|cx| lookup.read_many::<EntityRecord>(cx, &table, "part", &wanted))?;
    assert_eq!(metrics.chunk_queries(), 3);
    Ok(())
}

#[test]
fn strict_reads_name_the_missing_id() -> Result<()> {
    let (mut store, cat) = open_catalog_with(LedgerOptions::default())?;
    seed_parts(&mut store, cat.part, 2)?;
    let table = store.schema().entity(cat.part).table.clone();
    let lookup = store.lookup();

    let err = store
        .transaction(|cx| {
            lookup.read_many::<EntityRecord>(cx, &table, "part", &["p000", "gone", "p001"])
        })
        .expect_err("gone is unknown");
    assert_eq!(err.kind(), ErrorKind::MissingReference);
    assert!(matches!(
        err,
        LedgerError::MissingReference { ref kind, ref id } if kind == "part" && id == "gone"
    ));

    let slots = store.transaction(|cx| {
        lookup.read_many_tolerant::<EntityRecord>(cx, &table, &["p000", "gone", "p001"])
    })?;
    assert_eq!(slots.len(), 3);
    assert!(slots[0].is_some());
    assert!(slots[1].is_none());
    assert_eq!(slots[2].as_ref().map(|r| r.id.as_str()), Some("p001"));
    Ok(())
}

#[test]
fn current_and_history_aliases_differ() -> Result<()> {
    let (mut store, cat) = open_catalog_with(LedgerOptions::default())?;
    let rows = seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    let ledger = store.ledger();
    store.transaction(|cx| ledger.bump(cx, cat.part, &rows[0], Some("first")))?;
    let table = store.schema().entity(cat.part).table.clone();
    let lookup = store.lookup();

    let current: Vec<EntityRecord> = store.transaction(|cx| {
        lookup.read_by_foreign_key(cx, &table, ec::ID, &["p1"], Alias::Current, None)
    })?;
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].iteration, 2);

    let all: Vec<EntityRecord> = store.transaction(|cx| {
        lookup.read_by_foreign_key(cx, &table, ec::ID, &["p1"], Alias::History, None)
    })?;
    assert_eq!(all.len(), 2);

    let first = Condition::eq(ec::ITERATION, 1i64);
    let archived: Vec<EntityRecord> = store.transaction(|cx| {
        lookup.read_by_foreign_key(cx, &table, ec::ID, &["p1"], Alias::History, Some(&first))
    })?;
    assert_eq!(archived.len(), 1);
    assert!(!archived[0].latest);
    assert_eq!(archived[0].update_note.as_deref(), Some("first"));
    Ok(())
}

#[test]
fn the_padding_sentinel_never_resolves() -> Result<()> {
    let (store, _cat) = open_catalog_with(LedgerOptions::default())?;
    let lookup = store.lookup();
    assert_eq!(lookup.sentinel(), itergraph::types::NEVERLAND);
    let err = lookup.check_id("NEVERLAND").expect_err("sentinel");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(lookup.check_id("").is_err());
    Ok(())
}
