//! # Filter & Shape Integration Tests
//!
//! Filter independence, range-string resolution, complex expressions,
//! statement-cache reuse across shape-preserving mutations, order
//! determinism, and cursor equivalence.

mod common;

use common::{backend_with_numbers, int, session_over};
use rowset::{Cursor, CursorError, OwnedValue};

#[test]
fn test_exact_range_clear_counts() {
    let backend = backend_with_numbers(&[11, 22, 33]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.set_exact("numb", 22).unwrap();
    assert_eq!(cursor.count().unwrap(), 1);

    cursor.set_range("numb", None, None).unwrap();
    assert_eq!(cursor.count().unwrap(), 3);

    cursor
        .set_range("numb", Some(OwnedValue::Int(22)), Some(OwnedValue::Int(33)))
        .unwrap();
    assert_eq!(cursor.count().unwrap(), 2);
}

#[test]
fn test_filters_are_independent_per_field() {
    let backend = backend_with_numbers(&[1, 2, 3]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.set_exact("numb", 2).unwrap();
    cursor.set_exact("id", 99).unwrap();
    cursor.clear_filter("id").unwrap();
    // Clearing id left numb untouched.
    assert_eq!(cursor.count().unwrap(), 1);
    assert!(cursor.first().unwrap());
    assert_eq!(int(cursor.value("numb").unwrap()), 2);
}

#[test]
fn test_pattern_grammar_resolves_against_column_type() {
    let backend = backend_with_numbers(&[5, 15, 25]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.set_pattern("numb", "15").unwrap();
    assert_eq!(cursor.count().unwrap(), 1);

    cursor.set_pattern("numb", "10..20").unwrap();
    assert_eq!(cursor.count().unwrap(), 1);

    cursor.set_pattern("numb", "10..").unwrap();
    assert_eq!(cursor.count().unwrap(), 2);
}

#[test]
fn test_complex_filter_counts_and_rejects_unknown_columns() {
    let backend = backend_with_numbers(&[1, 2, 3, 4]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.set_complex_filter("numb > 1 AND numb < 4").unwrap();
    assert_eq!(cursor.count().unwrap(), 2);

    cursor.clear_complex_filter();
    assert_eq!(cursor.count().unwrap(), 4);

    let err = cursor.set_complex_filter("nope = 1").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::InvalidFilterExpression(_))
    ));
}

#[test]
fn test_value_only_change_reuses_cached_statement() {
    let backend = backend_with_numbers(&[1, 2, 3]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.set_exact("numb", 1).unwrap();
    assert!(cursor.first().unwrap());
    let prepared = backend.prepare_count();

    // ExactValue -> ExactValue on the same field keeps the statement.
    cursor.set_exact("numb", 2).unwrap();
    assert!(cursor.first().unwrap());
    assert_eq!(int(cursor.value("numb").unwrap()), 2);
    assert_eq!(backend.prepare_count(), prepared);

    // Switching the filter kind rebuilds.
    cursor
        .set_range("numb", Some(OwnedValue::Int(2)), None)
        .unwrap();
    assert!(cursor.first().unwrap());
    assert!(backend.prepare_count() > prepared);
}

#[test]
fn test_navigation_skip_invalidates_only_directional_statements() {
    let backend = backend_with_numbers(&[1, 2, 3, 4, 5]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    assert!(cursor.first().unwrap());
    assert!(cursor.next().unwrap());
    let prepared = backend.prepare_count();

    // A changed skip recompiles forward/backward but not first.
    assert!(cursor.next_by(2).unwrap());
    assert!(backend.prepare_count() > prepared);
    let after_skip = backend.prepare_count();
    assert!(cursor.first().unwrap());
    assert_eq!(backend.prepare_count(), after_skip);
}

#[test]
fn test_order_appends_primary_key() {
    let backend = backend_with_numbers(&[1]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.set_order(&[("numb", true)]).unwrap();
    assert_eq!(cursor.order_by_column_names(), vec!["numb", "id"]);

    let mut other = Cursor::open(&session, "t").unwrap();
    other.set_order(&[("numb", true)]).unwrap();
    assert_eq!(cursor.order_by_column_names(), other.order_by_column_names());
}

#[test]
fn test_duplicate_order_column_rejected() {
    let backend = backend_with_numbers(&[1]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    let err = cursor
        .set_order(&[("numb", false), ("numb", true)])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::Validation(_))
    ));
}

#[test]
fn test_descending_order() {
    let backend = backend_with_numbers(&[3, 1, 2]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", true)]).unwrap();

    assert!(cursor.first().unwrap());
    assert_eq!(int(cursor.value("numb").unwrap()), 3);
    assert!(cursor.next().unwrap());
    assert_eq!(int(cursor.value("numb").unwrap()), 2);
}

#[test]
fn test_copy_round_trip_is_equivalent() {
    let backend = backend_with_numbers(&[1, 2, 3]);
    let session = session_over(&backend);
    let mut a = Cursor::open(&session, "t").unwrap();
    a.set_exact("numb", 2).unwrap();
    a.set_complex_filter("id > 0").unwrap();
    a.set_order(&[("numb", true)]).unwrap();

    let mut b = Cursor::open(&session, "t").unwrap();
    assert!(!b.equivalent_to(&a));
    b.copy_filters_from(&a).unwrap();
    b.copy_order_from(&a).unwrap();
    assert!(b.equivalent_to(&a));
    assert!(a.equivalent_to(&b));
    assert_eq!(b.count().unwrap(), a.count().unwrap());
}

#[test]
fn test_type_mismatched_filter_value_rejected() {
    let backend = backend_with_numbers(&[1]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    let err = cursor.set_exact("numb", "not a number").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::Validation(_))
    ));
}

#[test]
fn test_export_text_quotes_on_demand() {
    let backend = backend_with_numbers(&[7]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    assert!(cursor.first().unwrap());
    assert_eq!(cursor.export_text(';'), "1;7;1");
}

#[test]
fn test_row_limit_bounds_the_window() {
    let backend = backend_with_numbers(&[1, 2, 3, 4, 5]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();
    cursor.set_row_limit(2);

    assert!(cursor.last().unwrap());
    assert_eq!(int(cursor.value("numb").unwrap()), 2);
}
