//! # Navigation Integration Tests
//!
//! Traversal of the filtered, ordered set: edges, directional steps,
//! command strings, streaming, pagination, and ordinal positions.

mod common;

use common::{backend_with_numbers, int, session_over};
use rowset::{Cursor, CursorError, NavState, OwnedValue};

fn numb(cursor: &Cursor) -> i64 {
    int(cursor.value("numb").unwrap())
}

#[test]
fn test_first_next_walks_in_order() {
    let backend = backend_with_numbers(&[1, 2, 3, 4, 5]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    assert!(cursor.first().unwrap());
    assert_eq!(numb(&cursor), 1);
    for expected in 2..=5 {
        assert!(cursor.next().unwrap());
        assert_eq!(numb(&cursor), expected);
    }
    // Past the end: no movement, no error, repeatedly.
    assert!(!cursor.next().unwrap());
    assert!(!cursor.next().unwrap());
    assert_eq!(numb(&cursor), 5);
    assert!(cursor.is_positioned());
}

#[test]
fn test_last_and_backward_walk() {
    let backend = backend_with_numbers(&[10, 20, 30]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    assert!(cursor.last().unwrap());
    assert_eq!(numb(&cursor), 30);
    assert!(cursor.prev().unwrap());
    assert_eq!(numb(&cursor), 20);
    assert!(cursor.prev().unwrap());
    assert!(!cursor.prev().unwrap());
    assert_eq!(numb(&cursor), 10);
}

#[test]
fn test_next_from_unpositioned_is_first() {
    let backend = backend_with_numbers(&[7, 8]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    assert_eq!(cursor.nav_state(), NavState::Unpositioned);
    assert!(cursor.next().unwrap());
    assert_eq!(numb(&cursor), 7);
}

#[test]
fn test_empty_set_edges_return_false() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    assert!(!cursor.first().unwrap());
    assert!(!cursor.last().unwrap());
    assert!(!cursor.next().unwrap());
    assert!(!cursor.is_positioned());
}

#[test]
fn test_multi_row_steps() {
    let backend = backend_with_numbers(&[1, 2, 3, 4, 5, 6, 7]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    assert!(cursor.first().unwrap());
    assert!(cursor.next_by(3).unwrap());
    assert_eq!(numb(&cursor), 4);
    assert!(cursor.prev_by(2).unwrap());
    assert_eq!(numb(&cursor), 2);
    // Zero steps: no movement, reports positioning.
    assert!(cursor.next_by(0).unwrap());
    assert_eq!(numb(&cursor), 2);
    // Overshooting the end misses without moving.
    assert!(!cursor.next_by(100).unwrap());
    assert_eq!(numb(&cursor), 2);
}

#[test]
fn test_negative_step_is_validation_error() {
    let backend = backend_with_numbers(&[1]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    let err = cursor.next_by(-1).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::Validation(_))
    ));
}

#[test]
fn test_find_stops_on_first_hit() {
    let backend = backend_with_numbers(&[4, 5, 6]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    // '=' misses while unpositioned, '-' lands on the first row.
    assert!(cursor.find("=-").unwrap());
    assert_eq!(numb(&cursor), 4);
    assert!(cursor.find(">").unwrap());
    assert_eq!(numb(&cursor), 5);
}

#[test]
fn test_find_exhausts_on_total_miss() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    assert!(!cursor.find("-+").unwrap());
    assert_eq!(cursor.nav_state(), NavState::Exhausted);
}

#[test]
fn test_find_rejects_unknown_commands_before_running() {
    let backend = backend_with_numbers(&[1, 2]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    let err = cursor.find("-x").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::Validation(_))
    ));
    // Nothing executed: still unpositioned.
    assert_eq!(cursor.nav_state(), NavState::Unpositioned);
}

#[test]
fn test_find_strict_raises_record_not_found() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    let err = cursor.find_strict("-").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::RecordNotFound { .. })
    ));
}

#[test]
fn test_refresh_sees_concurrent_change() {
    let backend = backend_with_numbers(&[1, 2, 3]);
    let session = session_over(&backend);
    // Primary-key order, so the refresh anchor survives the numb update.
    let mut reader = Cursor::open(&session, "t").unwrap();
    assert!(reader.first().unwrap());
    let id = int(reader.value("id").unwrap());

    let mut writer = Cursor::open(&session, "t").unwrap();
    writer.get_by_key(&[OwnedValue::Int(id)]).unwrap();
    writer.set_value("numb", 99).unwrap();
    writer.update().unwrap();

    assert!(reader.refresh().unwrap());
    assert_eq!(numb(&reader), 99);
}

#[test]
fn test_streaming_walks_whole_set() {
    let numbs: Vec<i64> = (1..=200).collect();
    let backend = backend_with_numbers(&numbs);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    let mut seen = Vec::new();
    while cursor.next_in_set().unwrap() {
        seen.push(numb(&cursor));
    }
    assert_eq!(seen, numbs);
}

#[test]
fn test_iterator_restarts_after_reset() {
    let backend = backend_with_numbers(&[3, 1, 2]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    let first_pass: Vec<i64> = cursor
        .iter_rows()
        .map(|row| int(&row.unwrap()[1]))
        .collect();
    assert_eq!(first_pass, vec![1, 2, 3]);

    cursor.reset();
    let second_pass: Vec<i64> = cursor
        .iter_rows()
        .map(|row| int(&row.unwrap()[1]))
        .collect();
    assert_eq!(second_pass, first_pass);
}

#[test]
fn test_offset_window() {
    let backend = backend_with_numbers(&[1, 2, 3, 4, 5]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();
    cursor.set_offset(2);

    assert!(cursor.first().unwrap());
    assert_eq!(numb(&cursor), 3);
    assert!(cursor.last().unwrap());
    assert_eq!(numb(&cursor), 5);
}

#[test]
fn test_position_is_one_based_ordinal() {
    let backend = backend_with_numbers(&[10, 20, 30, 40]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_order(&[("numb", false)]).unwrap();

    assert!(cursor.first().unwrap());
    assert_eq!(cursor.position().unwrap(), 1);
    assert!(cursor.next().unwrap());
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.position().unwrap(), 3);
}

#[test]
fn test_position_requires_positioned_cursor() {
    let backend = backend_with_numbers(&[1]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    let err = cursor.position().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::Validation(_))
    ));
}

#[test]
fn test_get_by_key_bypasses_filters() {
    let backend = backend_with_numbers(&[1, 2, 3]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_exact("numb", 3).unwrap();

    assert!(cursor.try_get_by_key(&[OwnedValue::Int(1)]).unwrap());
    assert_eq!(numb(&cursor), 1);
    assert!(!cursor.try_get_by_key(&[OwnedValue::Int(99)]).unwrap());

    let err = cursor.get_by_key(&[OwnedValue::Int(99)]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::RecordNotFound { .. })
    ));
}

#[test]
fn test_closed_cursor_rejects_navigation() {
    let backend = backend_with_numbers(&[1]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.close();

    let err = cursor.first().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::ClosedResource("cursor"))
    ));
}
