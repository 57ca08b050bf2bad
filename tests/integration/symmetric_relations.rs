#![allow(missing_docs)]

mod common;

use common::{current, iteration, open_catalog, seed, Catalog};
use itergraph::{
    DependentChange, DependentId, EntityId, ErrorKind, NewDependent, Result, Store,
};

fn mated_parts() -> Result<(Store, Catalog)> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("a", "Axle"), ("b", "Bearing"), ("c", "Collar")])?;
    let cascade = store.cascade();
    for link in [
        NewDependent::link("m1", "a", "b"),
        NewDependent::link("m2", "c", "a"),
        NewDependent::link("m3", "a", "a"),
    ] {
        store.transaction(|cx| cascade.on_create(cx, cat.mates, link))?;
    }
    Ok((store, cat))
}

#[test]
fn both_endpoints_see_the_relation() -> Result<()> {
    let (mut store, cat) = mated_parts()?;
    let adapter = store.symmetric();
    let a = EntityId::new("a");
    let views = store.transaction(|cx| adapter.dependents_of(cx, cat.mates, &a))?;

    let seen: Vec<(&str, bool)> = views
        .iter()
        .map(|v| (v.record.id.as_str(), v.mirrored))
        .collect();
    assert_eq!(seen, vec![("m1", false), ("m2", true), ("m3", false)]);
    assert!(views.iter().all(|v| v.record.owner == a));

    let m2 = &views[1];
    assert_eq!(m2.other_side(), Some(&EntityId::new("c")));
    assert_eq!(m2.record.owner_display.name.as_deref(), Some("Axle"));
    assert_eq!(m2.record.other_display.name.as_deref(), Some("Collar"));
    assert_eq!(views[2].other_side(), Some(&a));
    Ok(())
}

#[test]
fn many_endpoints_are_grouped_by_viewer() -> Result<()> {
    let (mut store, cat) = mated_parts()?;
    let adapter = store.symmetric();
    let grouped = store.transaction(|cx| {
        adapter.dependents_of_many(cx, cat.mates, &["b", "c", "missing", "b"])
    })?;
    assert_eq!(grouped.len(), 2);

    let b = &grouped["b"];
    assert_eq!(b.len(), 1);
    assert!(b[0].mirrored);
    assert_eq!(b[0].other_side(), Some(&EntityId::new("a")));

    let c = &grouped["c"];
    assert_eq!(c.len(), 1);
    assert!(!c[0].mirrored);
    assert_eq!(c[0].record.id, DependentId::new("m2"));
    Ok(())
}

#[test]
fn a_pair_is_related_at_most_once() -> Result<()> {
    let (mut store, cat) = mated_parts()?;
    let cascade = store.cascade();

    let err = store
        .transaction(|cx| cascade.on_create(cx, cat.mates, NewDependent::link("m4", "b", "a")))
        .expect_err("b-a mirrors the open a-b");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    let err = store
        .transaction(|cx| {
            cascade.create_batch(
                cx,
                cat.mates,
                vec![
                    NewDependent::link("m5", "b", "c"),
                    NewDependent::link("m6", "c", "b"),
                ],
            )
        })
        .expect_err("same pair twice in one batch");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    let m1 = DependentId::new("m1");
    let err = store
        .transaction(|cx| cascade.on_replace(cx, cat.mates, &m1, DependentChange::repoint("c")))
        .expect_err("a-c is already open as m2");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);

    // re-pointing at the same partner replaces the row it would collide with
    store.transaction(|cx| cascade.on_replace(cx, cat.mates, &m1, DependentChange::repoint("b")))?;
    let row = store
        .transaction(|cx| cascade.current(cx, cat.mates, &m1))?
        .expect("m1 open");
    assert_eq!(row.other, Some(EntityId::new("b")));
    Ok(())
}

#[test]
fn directed_relations_are_not_read_symmetrically() -> Result<()> {
    let (mut store, cat) = mated_parts()?;
    let adapter = store.symmetric();
    let a = EntityId::new("a");
    let err = store
        .transaction(|cx| adapter.dependents_of(cx, cat.uses, &a))
        .expect_err("uses is directed");
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    Ok(())
}

#[test]
fn history_reads_follow_the_owning_side() -> Result<()> {
    let (mut store, cat) = mated_parts()?;
    let history = store.history();
    let a = EntityId::new("a");

    let at_two = store.transaction(|cx| history.dependents_at(cx, cat.mates, &a, 2))?;
    let ids: Vec<&str> = at_two.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["m1"]);

    let at_three = store.transaction(|cx| history.dependents_at(cx, cat.mates, &a, 3))?;
    let ids: Vec<&str> = at_three.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m3"]);

    // m2 is owned by c, so it is dated in c's iterations
    let c = EntityId::new("c");
    let from_c = store.transaction(|cx| history.dependents_at(cx, cat.mates, &c, 2))?;
    assert_eq!(from_c.len(), 1);
    assert_eq!(from_c[0].id, DependentId::new("m2"));
    Ok(())
}

#[test]
fn as_of_reads_ignore_the_other_sides_counter() -> Result<()> {
    let (mut store, cat) = open_catalog()?;
    seed(&mut store, cat.part, &[("a", "Axle"), ("b", "Bearing")])?;
    let ledger = store.ledger();
    for round in 0..5 {
        let row = current(&mut store, cat.part, "a")?;
        let note = format!("touch {round}");
        store.transaction(|cx| ledger.bump(cx, cat.part, &row, Some(note.as_str())))?;
    }
    let cascade = store.cascade();
    store.transaction(|cx| cascade.on_create(cx, cat.mates, NewDependent::link("m1", "a", "b")))?;
    assert_eq!(iteration(&mut store, cat.part, "a")?, 7);
    assert_eq!(iteration(&mut store, cat.part, "b")?, 1);

    let history = store.history();
    let a = EntityId::new("a");
    let b = EntityId::new("b");
    let owned = store.transaction(|cx| history.dependents_at(cx, cat.mates, &a, 7))?;
    assert_eq!(owned.len(), 1);
    // the row is dated in a's iterations, never in b's
    for k in 1..=7 {
        let seen = store.transaction(|cx| history.dependents_at(cx, cat.mates, &b, k))?;
        assert!(seen.is_empty(), "iteration {k}: {seen:?}");
    }
    let snapshot = store
        .transaction(|cx| history.snapshot_at(cx, cat.part, &b, 1))?
        .expect("b at 1");
    assert!(snapshot.dependents.iter().all(|(_, rows)| rows.is_empty()));

    let adapter = store.symmetric();
    let live = store.transaction(|cx| adapter.dependents_of(cx, cat.mates, &b))?;
    assert_eq!(live.len(), 1);
    assert!(live[0].mirrored);
    Ok(())
}
