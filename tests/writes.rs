//! # Write-Protocol Integration Tests
//!
//! Insert probing, minimal-diff updates under optimistic concurrency,
//! deletes, lifecycle hooks, and permission gating.

mod common;

use common::{backend_with_numbers, int, numbers_table, session_over};
use rowset::{
    AccessPolicy, Action, ColumnDef, Cursor, CursorError, CursorHooks, DataType, MemoryBackend,
    OwnedValue, RowBuffer, Session, TableDef,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_insert_generates_key_and_version() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.init_row();
    cursor.set_value("numb", 42).unwrap();
    assert!(cursor.try_insert().unwrap());

    assert_eq!(int(cursor.value("id").unwrap()), 1);
    assert_eq!(int(cursor.value("numb").unwrap()), 42);
    assert_eq!(cursor.row().version(), 1);
    assert!(cursor.is_positioned());
}

#[test]
fn test_try_insert_same_explicit_key_twice() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();

    cursor.init_row();
    cursor.set_value("id", 7).unwrap();
    cursor.set_value("numb", 1).unwrap();
    assert!(cursor.try_insert().unwrap());

    cursor.init_row();
    cursor.set_value("id", 7).unwrap();
    cursor.set_value("numb", 2).unwrap();
    assert!(!cursor.try_insert().unwrap());
    // The probe populated the shadow with the existing row.
    assert_eq!(int(cursor.shadow().value("numb").unwrap()), 1);
    assert_eq!(cursor.shadow().version(), 1);

    let err = cursor.insert().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::DuplicateRecord { .. })
    ));
    assert_eq!(backend.rows("t").len(), 1);
}

#[test]
fn test_update_stale_version_fails_then_succeeds_after_reread() {
    let backend = backend_with_numbers(&[10]);
    let session = session_over(&backend);

    let mut a = Cursor::open(&session, "t").unwrap();
    let mut b = Cursor::open(&session, "t").unwrap();
    assert!(a.first().unwrap());
    assert!(b.first().unwrap());

    a.set_value("numb", 11).unwrap();
    a.update().unwrap();
    assert_eq!(a.row().version(), 2);

    // B still carries version 1.
    b.set_value("numb", 12).unwrap();
    let err = b.update().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::ConcurrentModification { .. })
    ));

    // Re-read, re-apply, resubmit.
    assert!(b.refresh().unwrap());
    assert_eq!(int(b.value("numb").unwrap()), 11);
    b.set_value("numb", 12).unwrap();
    b.update().unwrap();
    assert_eq!(b.row().version(), 3);
    assert_eq!(int(&backend.rows("t")[0][1]), 12);
}

#[test]
fn test_no_difference_update_skips_storage() {
    let backend = backend_with_numbers(&[5]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    assert!(cursor.first().unwrap());

    // Assigning the stored value is not a difference.
    cursor.set_value("numb", 5).unwrap();
    assert!(cursor.try_update().unwrap());
    assert_eq!(cursor.row().version(), 1);
    assert_eq!(int(&backend.rows("t")[0][2]), 1);
}

#[test]
fn test_update_vanished_row() {
    let backend = backend_with_numbers(&[1, 2]);
    let session = session_over(&backend);
    let mut a = Cursor::open(&session, "t").unwrap();
    let mut b = Cursor::open(&session, "t").unwrap();
    assert!(a.first().unwrap());
    assert!(b.first().unwrap());
    b.delete().unwrap();

    a.set_value("numb", 9).unwrap();
    assert!(!a.try_update().unwrap());
    let err = a.update().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::RecordNotFound { .. })
    ));
}

#[test]
fn test_delete_requires_current_version() {
    let backend = backend_with_numbers(&[4]);
    let session = session_over(&backend);
    let mut a = Cursor::open(&session, "t").unwrap();
    let mut b = Cursor::open(&session, "t").unwrap();
    assert!(a.first().unwrap());
    assert!(b.first().unwrap());

    a.set_value("numb", 5).unwrap();
    a.update().unwrap();

    let err = b.delete().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::ConcurrentModification { .. })
    ));

    assert!(b.refresh().unwrap());
    b.delete().unwrap();
    assert!(backend.rows("t").is_empty());
    assert!(!b.is_positioned());
}

#[test]
fn test_delete_all_honors_filters_and_skips_hooks() {
    let backend = backend_with_numbers(&[1, 2, 3, 4]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    let hooks = Arc::new(CountingHooks::default());
    cursor.set_hooks(hooks.clone());

    cursor.set_range("numb", Some(OwnedValue::Int(2)), Some(OwnedValue::Int(3)))
        .unwrap();
    assert_eq!(cursor.delete_all().unwrap(), 2);
    assert_eq!(backend.rows("t").len(), 2);
    assert_eq!(hooks.deletes.load(Ordering::Relaxed), 0);
}

#[derive(Default)]
struct CountingHooks {
    pre_inserts: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl CursorHooks for CountingHooks {
    fn before_insert(&self, _row: &RowBuffer) -> eyre::Result<()> {
        self.pre_inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn after_insert(&self, _row: &RowBuffer) -> eyre::Result<()> {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn before_update(&self, old: &RowBuffer, new: &RowBuffer) -> eyre::Result<()> {
        assert!(old.version() <= new.version() || new.version() == old.version());
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn after_delete(&self, _row: &RowBuffer) -> eyre::Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_hooks_fire_around_writes() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    let hooks = Arc::new(CountingHooks::default());
    cursor.set_hooks(hooks.clone());

    cursor.init_row();
    cursor.set_value("numb", 1).unwrap();
    cursor.insert().unwrap();
    cursor.set_value("numb", 2).unwrap();
    cursor.update().unwrap();
    cursor.delete().unwrap();

    assert_eq!(hooks.inserts.load(Ordering::Relaxed), 1);
    assert_eq!(hooks.updates.load(Ordering::Relaxed), 1);
    assert_eq!(hooks.deletes.load(Ordering::Relaxed), 1);
}

#[test]
fn test_pre_insert_hook_observes_colliding_attempts() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    let hooks = Arc::new(CountingHooks::default());
    cursor.set_hooks(hooks.clone());

    cursor.init_row();
    cursor.set_value("id", 3).unwrap();
    cursor.set_value("numb", 1).unwrap();
    assert!(cursor.try_insert().unwrap());

    cursor.init_row();
    cursor.set_value("id", 3).unwrap();
    cursor.set_value("numb", 2).unwrap();
    assert!(!cursor.try_insert().unwrap());

    // The pre-insert hook ran for the colliding attempt as well.
    assert_eq!(hooks.pre_inserts.load(Ordering::Relaxed), 2);
    assert_eq!(hooks.inserts.load(Ordering::Relaxed), 1);
}

struct FailingHooks;

impl CursorHooks for FailingHooks {
    fn before_insert(&self, _row: &RowBuffer) -> eyre::Result<()> {
        eyre::bail!("rejected by business rule")
    }
}

#[test]
fn test_hook_failure_aborts_the_operation() {
    let backend = backend_with_numbers(&[]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    cursor.set_hooks(Arc::new(FailingHooks));

    cursor.init_row();
    cursor.set_value("numb", 1).unwrap();
    assert!(cursor.try_insert().is_err());
    assert!(backend.rows("t").is_empty());
}

struct ReadOnly;

impl AccessPolicy for ReadOnly {
    fn is_allowed(&self, _object: &str, action: Action) -> bool {
        action == Action::Read
    }
}

#[test]
fn test_permission_denied_names_action_and_object() {
    let backend = MemoryBackend::new();
    backend.create_table(numbers_table());
    backend
        .load_rows(
            "t",
            vec![vec![
                OwnedValue::Int(1),
                OwnedValue::Int(5),
                OwnedValue::Int(1),
            ]],
        )
        .unwrap();
    let session = Session::with_policy(Arc::new(backend), Arc::new(ReadOnly));
    let mut cursor = Cursor::open(&session, "t").unwrap();

    assert!(cursor.first().unwrap());
    cursor.set_value("numb", 6).unwrap();
    let err = cursor.update().unwrap_err();
    match err.downcast_ref::<CursorError>() {
        Some(CursorError::PermissionDenied { action, object }) => {
            assert_eq!(*action, "Modify");
            assert_eq!(object, "t");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_wide_table_rejected_at_open() {
    let backend = MemoryBackend::new();
    let columns: Vec<ColumnDef> = (0..65)
        .map(|i| ColumnDef::new(format!("c{i}"), DataType::Int8))
        .collect();
    backend.create_table(TableDef::new("wide", columns).with_primary_key(vec!["c0"]));
    let session = session_over(&backend);

    // The insert/update column masks address 64 columns at most.
    let err = Cursor::open(&session, "wide").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::Validation(_))
    ));
}

#[test]
fn test_closed_session_blocks_writes() {
    let backend = backend_with_numbers(&[3]);
    let session = session_over(&backend);
    let mut cursor = Cursor::open(&session, "t").unwrap();
    assert!(cursor.first().unwrap());
    session.close();

    cursor.set_value("numb", 4).unwrap();
    let err = cursor.update().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CursorError>(),
        Some(CursorError::ClosedResource("session"))
    ));
}
