#![allow(missing_docs)]

mod common;

use std::path::Path;

use common::{catalog_schema, seed, Catalog};
use itergraph::admin::{verify, VerifyLevel, VerifySeverity};
use itergraph::{DependentChange, DependentId, LedgerOptions, NewDependent, Result, Store};
use rusqlite::Connection;
use serde_json::json;
use tempfile::tempdir;

fn open_file(path: &Path) -> Result<(Store, Catalog)> {
    let (schema, cat) = catalog_schema()?;
    Ok((Store::open(path, schema, LedgerOptions::default())?, cat))
}

fn populate(store: &mut Store, cat: Catalog) -> Result<()> {
    seed(store, cat.part, &[("p1", "Bracket"), ("p2", "Hinge")])?;
    seed(store, cat.supplier, &[("s1", "Acme"), ("s2", "Beta")])?;
    let cascade = store.cascade();
    store.transaction(|cx| {
        cascade.create_batch(
            cx,
            cat.sourcing,
            vec![
                NewDependent::link("l1", "p1", "s1"),
                NewDependent::link("l2", "p2", "s2"),
            ],
        )
    })?;
    store.transaction(|cx| cascade.on_create(cx, cat.specs, NewDependent::child("t1", "p1", json!(3))))?;
    let l1 = DependentId::new("l1");
    store.transaction(|cx| cascade.on_replace(cx, cat.sourcing, &l1, DependentChange::repoint("s2")))?;
    store.transaction(|cx| cascade.on_create(cx, cat.mates, NewDependent::link("m1", "p1", "p2")))?;
    Ok(())
}

#[test]
fn a_store_built_through_the_cascade_verifies_clean() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let (mut store, cat) = open_file(&dir.path().join("ledger.db"))?;
    populate(&mut store, cat)?;

    let full = verify(&mut store, VerifyLevel::Full)?;
    assert!(full.success, "{:?}", full.findings);
    assert!(full.findings.is_empty(), "{:?}", full.findings);
    assert!(!full.truncated);
    assert_eq!(full.counts.entities, 4);
    // p1 reaches 5, p2 reaches 2, suppliers stay at 1
    assert_eq!(full.counts.entity_rows, 9);
    assert_eq!(full.counts.dependents, 4);
    assert_eq!(full.counts.intervals, 5);
    assert_eq!(full.counts.open_intervals, 4);

    let fast = verify(&mut store, VerifyLevel::Fast)?;
    assert!(fast.success);
    assert_eq!(fast.counts.entity_rows, full.counts.entity_rows);
    assert_eq!(fast.counts.open_intervals, full.counts.open_intervals);
    Ok(())
}

#[test]
fn a_lost_latest_flag_is_reported_at_both_levels() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    {
        let (mut store, cat) = open_file(&path)?;
        populate(&mut store, cat)?;
    }
    let conn = Connection::open(&path)?;
    conn.execute("UPDATE ent_part SET latest = 0 WHERE id = 'p2'", [])?;
    drop(conn);

    let (mut store, _cat) = open_file(&path)?;
    let fast = verify(&mut store, VerifyLevel::Fast)?;
    assert!(!fast.success);
    assert_eq!(fast.findings[0].table, "ent_part");

    let full = verify(&mut store, VerifyLevel::Full)?;
    assert!(!full.success);
    assert!(full
        .findings
        .iter()
        .any(|f| f.severity == VerifySeverity::Error && f.message.contains("'p2' has no latest row")));
    // p2 has no current iteration any more, so its intervals lose their owner
    assert!(full
        .findings
        .iter()
        .any(|f| f.table == "rel_sourced_from" && f.message.contains("missing owner 'p2'")));
    Ok(())
}

#[test]
fn a_shifted_interval_breaks_the_chain() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("ledger.db");
    {
        let (mut store, cat) = open_file(&path)?;
        populate(&mut store, cat)?;
    }
    let conn = Connection::open(&path)?;
    let changed = conn.execute(
        "UPDATE rel_sourced_from SET first_iteration = first_iteration + 1 \
         WHERE id = 'l1' AND last_iteration = 999999999",
        [],
    )?;
    assert_eq!(changed, 1);
    drop(conn);

    let (mut store, _cat) = open_file(&path)?;
    let report = verify(&mut store, VerifyLevel::Full)?;
    assert!(!report.success);
    let messages: Vec<&str> = report.findings.iter().map(|f| f.message.as_str()).collect();
    assert!(
        messages.iter().any(|m| m.contains("'l1' has a gap")),
        "{messages:?}"
    );
    Ok(())
}

#[test]
fn missing_notes_are_only_warnings() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let (mut store, cat) = open_file(&dir.path().join("ledger.db"))?;
    let rows = seed(&mut store, cat.part, &[("p1", "Bracket")])?;
    let ledger = store.ledger();
    store.transaction(|cx| ledger.bump(cx, cat.part, &rows[0], None))?;

    let report = verify(&mut store, VerifyLevel::Full)?;
    assert!(report.success);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, VerifySeverity::Warning);
    Ok(())
}
