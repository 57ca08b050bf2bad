#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{current, iteration, open_catalog, seed};
use itergraph::ledger::InPlaceStates;
use itergraph::{DisplayFields, EntityRecord, ErrorKind, Result, Revision};

#[test]
fn create_stamps_first_iteration_and_latest() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    let created = seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    assert_eq!(created[0].iteration, 1);
    assert!(created[0].latest);
    assert!(created[0].last_version_flag());

    let ledger = store.ledger();
    let history = store.transaction(|cx| ledger.history(cx, cat.part, "p1"))?;
    assert_eq!(history.len(), 1);
    Ok(())
}

#[test]
fn k_changes_leave_k_contiguous_rows_with_one_latest() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    let ledger = store.ledger();
    for round in 0..4 {
        let owner = current(&mut store, cat.part, "p1")?;
        let note = format!("round {round}");
        store.transaction(|cx| ledger.bump(cx, cat.part, &owner, Some(note.as_str())))?;
    }

    let history = store.transaction(|cx| ledger.history(cx, cat.part, "p1"))?;
    let iterations: Vec<i64> = history.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3, 4, 5]);
    let latest: Vec<i64> = history
        .iter()
        .filter(|r| r.latest)
        .map(|r| r.iteration)
        .collect();
    assert_eq!(latest, vec![5]);
    // archived row k carries the note of the change from k to k + 1
    for (k, row) in history[..4].iter().enumerate() {
        assert_eq!(row.update_note, Some(format!("round {k}")));
    }
    assert_eq!(history[4].update_note, None);
    Ok(())
}

#[test]
fn a_stale_record_cannot_rewrite_history() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    let rows = seed(&mut store, cat.part, &[("o", "Bolt")])?;
    let ledger = store.ledger();
    store.transaction(|cx| ledger.bump(cx, cat.part, &rows[0], Some("one")))?;

    let mut stale = rows[0].clone();
    stale.display.name = Some("Stale".into());
    let err = store
        .transaction(|cx| ledger.bump(cx, cat.part, &stale, Some("two")))
        .expect_err("iteration 1 is archived");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(err.to_string().contains("is stale"), "{err}");

    let history = store.transaction(|cx| ledger.history(cx, cat.part, "o"))?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].display.name.as_deref(), Some("Bolt"));
    assert_eq!(history[0].update_note.as_deref(), Some("one"));
    assert!(!history[0].latest);
    assert_eq!(history[1].display.name.as_deref(), Some("Bolt"));
    assert!(history[1].latest);

    let ghost = {
        let mut row = rows[0].clone();
        row.id = "ghost".into();
        row
    };
    let err = store
        .transaction(|cx| ledger.advance(cx, cat.part, &ghost, None))
        .expect_err("never created");
    assert_eq!(err.kind(), ErrorKind::MissingReference);
    Ok(())
}

#[test]
fn bulk_writes_never_overwrite_archived_rows() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    let rows = seed(&mut store, cat.part, &[("o", "Bolt")])?;
    let ledger = store.ledger();
    store.transaction(|cx| ledger.bump(cx, cat.part, &rows[0], Some("one")))?;
    let table = store.schema().entity(cat.part).table.clone();
    let lookup = store.lookup();

    let mut clash = rows[0].clone();
    clash.display.name = Some("Clash".into());
    clash.latest = false;
    assert!(store
        .transaction(|cx| lookup.bulk_update(cx, &table, std::slice::from_ref(&clash)))
        .is_err());
    let err = store
        .transaction(|cx| lookup.archive_insert(cx, &table, std::slice::from_ref(&clash)))
        .expect_err("row 1 is already archived");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(store
        .transaction(|cx| lookup.update_in_place(cx, &table, std::slice::from_ref(&clash)))
        .is_err());

    let history = store.transaction(|cx| ledger.history(cx, cat.part, "o"))?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].display.name.as_deref(), Some("Bolt"));
    Ok(())
}

#[test]
fn advancing_an_uninitialized_entity_is_an_invariant_violation() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    let ledger = store.ledger();
    let fresh = EntityRecord::new("ghost", DisplayFields::named("Ghost"));
    let err = store
        .transaction(|cx| ledger.advance(cx, cat.part, &fresh, None))
        .expect_err("uninitialized");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    let mut twice = EntityRecord::new("p9", DisplayFields::default());
    ledger.initialize(&mut twice)?;
    let err = ledger.initialize(&mut twice).expect_err("initialized twice");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    Ok(())
}

#[test]
fn advance_batch_rejects_mismatched_lengths() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    let rows = seed(&mut store, cat.part, &[("p1", "Bolt"), ("p2", "Nut")])?;
    let ledger = store.ledger();
    let err = store
        .transaction(|cx| ledger.advance_batch(cx, cat.part, &rows, &[None]))
        .expect_err("length mismatch");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 1);
    Ok(())
}

#[test]
fn advance_batch_archives_in_one_statement() -> Result<()> {
    let metrics = Arc::new(itergraph::CounterMetrics::default());
    let (mut store, cat) =
        common::open_catalog_with(itergraph::LedgerOptions::default().metrics(metrics.clone()))?;
    let rows = seed(&mut store, cat.part, &[("p1", "Bolt"), ("p2", "Nut"), ("p3", "Washer")])?;
    let ledger = store.ledger();
    metrics.reset();
    let promoted = store.transaction(|cx| {
        ledger.bump_batch(cx, cat.part, &rows, &[None, Some("renamed".to_string()), None])
    })?;
    assert_eq!(
        promoted.iter().map(|r| r.iteration).collect::<Vec<_>>(),
        vec![2, 2, 2]
    );
    assert!(promoted.iter().all(|r| r.update_note.is_none()));
    assert_eq!(metrics.archive_statements(), 1);
    assert_eq!(metrics.update_statements(), 1);

    let history = store.transaction(|cx| ledger.history(cx, cat.part, "p2"))?;
    assert_eq!(history[0].update_note.as_deref(), Some("renamed"));
    Ok(())
}

#[test]
fn duplicate_and_reserved_ids_are_rejected() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    let err = seed(&mut store, cat.part, &[("p1", "Bolt again")]).expect_err("exists");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    let err = seed(&mut store, cat.part, &[("NEVERLAND", "Nowhere")]).expect_err("sentinel");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    let err = seed(&mut store, cat.part, &[("p2", "a"), ("p2", "b")]).expect_err("dup");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    Ok(())
}

#[test]
fn revise_skips_unchanged_and_rejects_stale_rows() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    let ledger = store.ledger();

    let same = current(&mut store, cat.part, "p1")?;
    let outcome = store.transaction(|cx| ledger.revise(cx, cat.part, same.clone(), None))?;
    assert!(matches!(outcome, Revision::Unchanged(_)));

    let mut renamed = same.clone();
    renamed.display.name = Some("Hex bolt".into());
    let outcome = store.transaction(|cx| ledger.revise(cx, cat.part, renamed, None))?;
    match outcome {
        Revision::Advanced(row) => {
            assert_eq!(row.iteration, 2);
            assert_eq!(row.update_note, None);
        }
        other => panic!("expected an advance, got {other:?}"),
    }
    let history = store.transaction(|cx| ledger.history(cx, cat.part, "p1"))?;
    assert_eq!(history[0].display.name.as_deref(), Some("Bolt"));
    assert_eq!(history[0].update_note.as_deref(), Some("Updated part 'Hex bolt'"));

    let mut stale = same;
    stale.display.name = Some("Carriage bolt".into());
    let err = store
        .transaction(|cx| ledger.revise(cx, cat.part, stale, None))
        .expect_err("stale");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 2);
    Ok(())
}

#[test]
fn state_policy_decides_whether_a_transition_advances() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    store.set_state_policy(Arc::new(InPlaceStates::new(["in_review"])));
    seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    let ledger = store.ledger();

    let mut reviewing = current(&mut store, cat.part, "p1")?;
    reviewing.display.state = Some("in_review".into());
    let outcome = store.transaction(|cx| ledger.revise(cx, cat.part, reviewing, None))?;
    assert!(matches!(outcome, Revision::InPlace(_)));
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 1);

    let mut released = current(&mut store, cat.part, "p1")?;
    assert_eq!(released.display.state.as_deref(), Some("in_review"));
    released.display.state = Some("released".into());
    let outcome = store.transaction(|cx| ledger.revise(cx, cat.part, released, None))?;
    assert_eq!(outcome.record().iteration, 2);
    Ok(())
}

#[test]
fn failed_transaction_leaves_no_trace() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bolt")])?;
    let ledger = store.ledger();
    let owner = current(&mut store, cat.part, "p1")?;
    let err = store
        .transaction(|cx| {
            ledger.bump(cx, cat.part, &owner, Some("doomed"))?;
            ledger.create(cx, cat.part, EntityRecord::new("p1", DisplayFields::default()))
        })
        .expect_err("second create fails");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    let history = store.transaction(|cx| ledger.history(cx, cat.part, "p1"))?;
    assert_eq!(history.len(), 1);
    assert!(history[0].latest);
    Ok(())
}
