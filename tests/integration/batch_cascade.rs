#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{iteration, open_catalog, open_catalog_with, seed};
use itergraph::types::INFINITY;
use itergraph::{
    CounterMetrics, DependentChange, DependentId, EntityId, ErrorKind, LedgerOptions,
    NewDependent, Result,
};

#[test]
fn shared_owner_advances_once_per_batch() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let (mut store, cat) = open_catalog_with(LedgerOptions::default().metrics(metrics.clone()))?;
    seed(&mut store, cat.part, &[("p1", "Bracket"), ("p2", "Hinge")])?;
    seed(&mut store, cat.supplier, &[("s1", "Acme"), ("s2", "Beta")])?;
    let cascade = store.cascade();

    metrics.reset();
    let opened = store.transaction(|cx| {
        cascade.create_batch(
            cx,
            cat.sourcing,
            vec![
                NewDependent::link("a", "p1", "s1"),
                NewDependent::link("b", "p2", "s1"),
                NewDependent::link("c", "p1", "s2"),
            ],
        )
    })?;
    assert_eq!(metrics.archive_statements(), 1);
    assert_eq!(metrics.update_statements(), 1);

    let ids: Vec<&str> = opened.iter().map(|o| o.dependent.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(opened.iter().all(|o| o.dependent.first_iteration == 2));
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 2);
    assert_eq!(iteration(&mut store, cat.part, "p2")?, 2);
    assert_eq!(
        opened[0].note,
        "Created sourcing with supplier 'Acme'; Created sourcing with supplier 'Beta'"
    );
    assert_eq!(opened[0].owner, opened[2].owner);

    let ledger = store.ledger();
    let history = store.transaction(|cx| ledger.history(cx, cat.part, "p1"))?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].update_note.as_deref(), Some(opened[0].note.as_str()));
    assert_eq!(history[1].update_note, None);
    Ok(())
}

#[test]
fn batch_replace_and_remove_share_one_bump() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bracket")])?;
    seed(&mut store, cat.supplier, &[("s1", "Acme"), ("s2", "Beta"), ("s3", "Gamma")])?;
    let cascade = store.cascade();
    store.transaction(|cx| {
        cascade.create_batch(
            cx,
            cat.sourcing,
            vec![
                NewDependent::link("a", "p1", "s1"),
                NewDependent::link("b", "p1", "s2"),
            ],
        )
    })?;

    let closed = store.transaction(|cx| {
        cascade.replace_or_remove_batch(
            cx,
            cat.sourcing,
            vec![
                (DependentId::new("a"), Some(DependentChange::repoint("s3"))),
                (DependentId::new("b"), None),
            ],
        )
    })?;
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 3);
    assert!(closed.iter().all(|c| c.closed.last_iteration == 2));
    assert_eq!(
        closed[0].opened.as_ref().map(|o| (o.first_iteration, o.last_iteration)),
        Some((3, INFINITY))
    );
    assert!(closed[1].opened.is_none());
    assert_eq!(
        closed[1].note,
        "Updated sourcing with supplier 'Gamma'; Removed sourcing with supplier 'Beta'"
    );

    let owner = EntityId::new("p1");
    let open = store.transaction(|cx| cascade.dependents_of(cx, cat.sourcing, &owner))?;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].other, Some(EntityId::new("s3")));
    Ok(())
}

#[test]
fn duplicate_dependents_in_one_batch_are_rejected() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bracket")])?;
    seed(&mut store, cat.supplier, &[("s1", "Acme")])?;
    let cascade = store.cascade();

    let err = store
        .transaction(|cx| {
            cascade.create_batch(
                cx,
                cat.sourcing,
                vec![
                    NewDependent::link("a", "p1", "s1"),
                    NewDependent::link("a", "p1", "s1"),
                ],
            )
        })
        .expect_err("duplicate id");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 1);

    store.transaction(|cx| cascade.on_create(cx, cat.sourcing, NewDependent::link("a", "p1", "s1")))?;
    let err = store
        .transaction(|cx| {
            cascade.replace_or_remove_batch(
                cx,
                cat.sourcing,
                vec![(DependentId::new("a"), None), (DependentId::new("a"), None)],
            )
        })
        .expect_err("duplicate close");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 2);
    Ok(())
}

#[test]
fn one_failing_element_aborts_the_whole_batch() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("p1", "Bracket"), ("p2", "Hinge")])?;
    seed(&mut store, cat.supplier, &[("s1", "Acme")])?;
    let cascade = store.cascade();

    let err = store
        .transaction(|cx| {
            cascade.create_batch(
                cx,
                cat.sourcing,
                vec![
                    NewDependent::link("a", "p1", "s1"),
                    NewDependent::link("b", "p2", "missing"),
                ],
            )
        })
        .expect_err("unknown supplier");
    assert_eq!(err.kind(), ErrorKind::MissingReference);
    assert_eq!(iteration(&mut store, cat.part, "p1")?, 1);
    assert_eq!(iteration(&mut store, cat.part, "p2")?, 1);
    let id = DependentId::new("a");
    assert!(store
        .transaction(|cx| cascade.current(cx, cat.sourcing, &id))?
        .is_none());
    Ok(())
}

#[test]
fn large_batches_read_in_chunks() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let (mut store, cat) = open_catalog_with(LedgerOptions::default().metrics(metrics.clone()))?;
    let names: Vec<(String, String)> = (0..45)
        .map(|i| (format!("p{i:02}"), format!("Part {i}")))
        .collect();
    let pairs: Vec<(&str, &str)> = names
        .iter()
        .map(|(id, name)| (id.as_str(), name.as_str()))
        .collect();
    seed(&mut store, cat.part, &pairs)?;
    let cascade = store.cascade();

    let children: Vec<NewDependent> = names
        .iter()
        .map(|(id, _)| NewDependent::child(format!("spec-{id}"), id.as_str(), serde_json::json!(1)))
        .collect();
    metrics.reset();
    let opened = store.transaction(|cx| cascade.create_batch(cx, cat.specs, children))?;
    assert_eq!(opened.len(), 45);
    // id history, owner read and pre-change read, three chunks apiece
    assert_eq!(metrics.chunk_queries(), 9);
    assert_eq!(metrics.archive_statements(), 1);
    assert_eq!(metrics.update_statements(), 1);
    Ok(())
}
