//! # Position-Interpolation Integration Tests
//!
//! Both refinement policies driven by a real cursor over the in-memory
//! backend, and the monotonicity of the resulting point sets.

mod common;

use common::{backend_with_numbers, int, session_over};
use rowset::{Cursor, PositionInterpolator, PositionProbe};

fn assert_monotone(interp: &PositionInterpolator) {
    for pair in interp.points().windows(2) {
        assert!(
            pair[0].ordinal() <= pair[1].ordinal(),
            "ordinals must not decrease with the key"
        );
    }
}

#[test]
fn test_stratified_seeds_over_cursor() {
    let numbs: Vec<i64> = (1..=100).map(|i| i * 7).collect();
    let backend = backend_with_numbers(&numbs);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    let mut interp = PositionInterpolator::for_cursor(&cursor);
    interp.refine_stratified(&mut cursor).unwrap();

    assert_eq!(interp.len(), 10);
    assert_monotone(&interp);
    assert_eq!(interp.points()[0].ordinal(), 1);
    assert_eq!(int(&interp.points()[0].key()[0]), 7);
}

#[test]
fn test_generic_refinement_over_cursor() {
    let numbs: Vec<i64> = (1..=500).collect();
    let backend = backend_with_numbers(&numbs);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    let mut interp = PositionInterpolator::for_cursor(&cursor);
    interp.refine_generic(&mut cursor).unwrap();

    assert!(interp.len() > 2);
    assert_monotone(&interp);
    assert_eq!(interp.points()[0].ordinal(), 1);
    assert_eq!(interp.points().last().unwrap().ordinal(), 500);

    // Every anchor is exact: the probed key really sits at that ordinal.
    for point in interp.points() {
        assert_eq!(cursor.exact_position(point.key()).unwrap(), point.ordinal());
    }
}

#[test]
fn test_refinement_honors_filters() {
    let numbs: Vec<i64> = (1..=60).collect();
    let backend = backend_with_numbers(&numbs);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();
    cursor
        .set_pattern("numb", "21..40")
        .unwrap();

    let mut interp = PositionInterpolator::for_cursor(&cursor);
    interp.refine_stratified(&mut cursor).unwrap();

    assert_monotone(&interp);
    let first = &interp.points()[0];
    assert_eq!(first.ordinal(), 1);
    assert_eq!(int(&first.key()[0]), 21);
    assert!(interp
        .points()
        .iter()
        .all(|p| (21..=40).contains(&int(&p.key()[0]))));
}

#[test]
fn test_bracket_brackets_unseen_keys() {
    let numbs: Vec<i64> = (1..=100).collect();
    let backend = backend_with_numbers(&numbs);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    let mut interp = PositionInterpolator::for_cursor(&cursor);
    interp.refine_stratified(&mut cursor).unwrap();

    let probe_key = cursor.key_at(42).unwrap().unwrap();
    let (below, above) = interp.bracket(&probe_key);
    let below = below.expect("lower anchor");
    let above = above.expect("upper anchor");
    assert!(below.ordinal() <= 42);
    assert!(above.ordinal() >= 42);
}
