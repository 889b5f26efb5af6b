//! Cursor writes: insert, minimal-diff update, delete, and filtered-set
//! delete, all under optimistic concurrency.
//!
//! Every versioned write carries the version token the cursor observed at
//! its last read. The backend compares it against the stored token and
//! rejects the statement on mismatch; the cursor re-raises that rejection
//! as `ConcurrentModification` with the record key. Updates first re-read
//! the stored row into the shadow buffer, so only the columns that actually
//! differ travel in the statement and the caller can inspect the winning
//! state after a conflict.
//!
//! Insert and update statements are cached per column bitmask, so a loop
//! inserting rows with the same field pattern compiles one statement.

use super::{Cursor, NavState as State};
use crate::backend::Action;
use crate::error::{BackendRejection, CursorError};
use crate::query::cache::StatementSlot;
use crate::query::shape::StatementKind;
use crate::types::{DataType, OwnedValue};
use eyre::Result;
use std::sync::Arc;

impl Cursor {
    /// Persists the row buffer as a new record. Returns `false` without
    /// writing when a record with the same key already exists; the shadow
    /// buffer then holds the existing record's stored state. The pre-insert
    /// hook runs before the duplicate probe, so it observes colliding
    /// attempts too.
    pub fn try_insert(&mut self) -> Result<bool> {
        self.check_permission(Action::Insert)?;
        self.ensure_open()?;

        if let Some(hooks) = self.hooks.clone() {
            hooks.before_insert(&self.row)?;
        }

        if !self.probe_free_insert() {
            let key = self.key_params(&self.row)?;
            if key.iter().all(|v| !matches!(v, OwnedValue::Null)) {
                let out =
                    self.run_key_slot(StatementSlot::GetByKey, StatementKind::GetByKey, &key)?;
                if let Some(values) = out.rows.into_iter().next() {
                    self.shadow.load(values);
                    return Ok(false);
                }
            }
        }

        let (presence, params) = self.insert_presence();
        let spec = self.key_spec(StatementKind::Insert { presence });
        let backend = Arc::clone(&self.backend);
        let table = Arc::clone(self.table());
        let stmt = self
            .cache
            .get_or_build_insert(presence, || backend.prepare(&table, &spec))?;
        let out = match stmt.execute(&params) {
            Ok(out) => out,
            Err(e) => {
                // Lost a race with a concurrent insert of the same key.
                if let Some(BackendRejection::DuplicateKey) = e.downcast_ref() {
                    let key = self.key_params(&self.row)?;
                    let probe =
                        self.run_key_slot(StatementSlot::GetByKey, StatementKind::GetByKey, &key)?;
                    if let Some(values) = probe.rows.into_iter().next() {
                        self.shadow.load(values);
                    }
                    return Ok(false);
                }
                return Err(e);
            }
        };

        let values = out.rows.into_iter().next().ok_or_else(|| {
            CursorError::Backend("insert returned no read-back row".into())
        })?;
        self.adopt_row(values);
        if let Some(hooks) = self.hooks.clone() {
            hooks.after_insert(&self.row)?;
        }
        Ok(true)
    }

    /// [`try_insert`](Self::try_insert) that raises `DuplicateRecord` when
    /// the key is taken.
    pub fn insert(&mut self) -> Result<()> {
        if self.try_insert()? {
            Ok(())
        } else {
            Err(CursorError::DuplicateRecord {
                object: self.table().name().to_string(),
                key: self.describe_key(&self.row),
            }
            .into())
        }
    }

    /// Writes the row buffer's modified columns back to storage. Returns
    /// `false` without writing when the stored row no longer exists. A
    /// no-difference update succeeds without touching storage. A version
    /// token newer than this cursor's last read raises
    /// `ConcurrentModification`; the shadow buffer then holds the winning
    /// state, so the caller can inspect it, re-read, and resubmit.
    pub fn try_update(&mut self) -> Result<bool> {
        self.check_permission(Action::Modify)?;
        self.ensure_open()?;
        if self.state != State::Positioned {
            return Err(CursorError::Validation("cursor is not positioned".into()).into());
        }

        // Record identity comes from the shadow: primary-key edits in the
        // row buffer travel as changed columns, not as a new identity.
        let key = self.key_params(&self.shadow)?;
        let out = self.run_key_slot(StatementSlot::GetByKey, StatementKind::GetByKey, &key)?;
        let Some(stored) = out.rows.into_iter().next() else {
            return Ok(false);
        };
        self.shadow.load(stored);

        let (mask, mut params) = self.changed_columns();
        if mask == 0 {
            return Ok(true);
        }

        let old = self.shadow.clone();
        if let Some(hooks) = self.hooks.clone() {
            hooks.before_update(&old, &self.row)?;
        }

        let versioned = self.table().version_column().is_some();
        params.extend(key);
        if versioned {
            params.push(OwnedValue::Int(self.row.version() as i64));
        }
        let spec = self.key_spec(StatementKind::Update { mask, versioned });
        let backend = Arc::clone(&self.backend);
        let table = Arc::clone(self.table());
        let stmt = self
            .cache
            .get_or_build_update(mask, || backend.prepare(&table, &spec))?;
        let out = match stmt.execute(&params) {
            Ok(out) => out,
            Err(e) => {
                if let Some(BackendRejection::VersionConflict) = e.downcast_ref() {
                    return Err(CursorError::ConcurrentModification {
                        object: self.table().name().to_string(),
                        key: self.describe_key(&self.shadow),
                    }
                    .into());
                }
                return Err(e);
            }
        };
        if out.affected == 0 {
            // Deleted between the re-read and the write.
            return Ok(false);
        }

        let values = out.rows.into_iter().next().ok_or_else(|| {
            CursorError::Backend("update returned no read-back row".into())
        })?;
        self.adopt_row(values);
        if let Some(hooks) = self.hooks.clone() {
            hooks.after_update(&old, &self.row)?;
        }
        Ok(true)
    }

    /// [`try_update`](Self::try_update) that raises `RecordNotFound` when
    /// the stored row has vanished.
    pub fn update(&mut self) -> Result<()> {
        if self.try_update()? {
            Ok(())
        } else {
            Err(CursorError::RecordNotFound {
                object: self.table().name().to_string(),
            }
            .into())
        }
    }

    /// Deletes the current record, honoring its version token. Leaves the
    /// cursor unpositioned on success.
    pub fn delete(&mut self) -> Result<()> {
        self.check_permission(Action::Delete)?;
        self.ensure_open()?;
        if self.state != State::Positioned {
            return Err(CursorError::Validation("cursor is not positioned".into()).into());
        }

        let doomed = self.row.clone();
        if let Some(hooks) = self.hooks.clone() {
            hooks.before_delete(&doomed)?;
        }

        let versioned = self.table().version_column().is_some();
        let mut params = self.key_params(&self.shadow)?;
        if versioned {
            params.push(OwnedValue::Int(self.row.version() as i64));
        }
        let out = match self.run_key_slot(
            StatementSlot::Delete,
            StatementKind::Delete { versioned },
            &params,
        ) {
            Ok(out) => out,
            Err(e) => {
                if let Some(BackendRejection::VersionConflict) = e.downcast_ref() {
                    return Err(CursorError::ConcurrentModification {
                        object: self.table().name().to_string(),
                        key: self.describe_key(&self.shadow),
                    }
                    .into());
                }
                return Err(e);
            }
        };
        if out.affected == 0 {
            return Err(CursorError::RecordNotFound {
                object: self.table().name().to_string(),
            }
            .into());
        }

        self.row.clear();
        self.shadow.clear();
        self.state = State::Unpositioned;
        if let Some(hooks) = self.hooks.clone() {
            hooks.after_delete(&doomed)?;
        }
        Ok(())
    }

    /// Deletes every row of the filtered set in one statement and returns
    /// the count. Lifecycle hooks do not run; version tokens are not
    /// consulted.
    pub fn delete_all(&mut self) -> Result<u64> {
        self.check_permission(Action::Delete)?;
        let out = self.run_shape_slot(StatementSlot::DeleteSet, StatementKind::DeleteSet, &[])?;
        self.row.clear();
        self.shadow.clear();
        self.stream = None;
        self.state = State::Unpositioned;
        Ok(out.affected)
    }

    /// Whether the key-collision probe before an insert can be skipped:
    /// the table has a single auto-generated integer key and the row
    /// buffer leaves it unset. Cached per cursor since the schema is
    /// immutable for the cursor's lifetime.
    fn probe_free_insert(&self) -> bool {
        let optimizable = match self.insert_fast_path.get() {
            Some(v) => v,
            None => {
                let pk = self.table().pk_indices();
                let v = pk.len() == 1 && {
                    let column = &self.table().columns()[pk[0]];
                    column.is_auto_generate() && column.data_type().is_integer()
                };
                self.insert_fast_path.set(Some(v));
                v
            }
        };
        optimizable
            && self
                .table()
                .pk_indices()
                .first()
                .and_then(|col| self.row.position_of(*col))
                .map(|pos| {
                    matches!(self.row.value_at(pos), OwnedValue::Null) && !self.row.dirty_at(pos)
                })
                .unwrap_or(false)
    }

    /// Presence bitmask and parameter list for an insert: columns that were
    /// explicitly assigned or hold a non-NULL value, ascending by table
    /// position. The version column is always backend-assigned.
    fn insert_presence(&self) -> (u64, Vec<OwnedValue>) {
        let mut presence = 0u64;
        let mut params = Vec::new();
        let version = self.table().version_column();
        for col in 0..self.table().columns().len() {
            if Some(col) == version {
                continue;
            }
            let Some(pos) = self.row.position_of(col) else {
                continue;
            };
            let value = self.row.value_at(pos);
            if self.row.dirty_at(pos) || !matches!(value, OwnedValue::Null) {
                presence |= 1 << col;
                params.push(value.clone());
            }
        }
        (presence, params)
    }

    /// Changed-column bitmask and values, diffed against the freshly read
    /// shadow. Blob columns compare by assignment only, so a large value
    /// that was merely read back is never re-sent.
    fn changed_columns(&self) -> (u64, Vec<OwnedValue>) {
        let mut mask = 0u64;
        let mut params = Vec::new();
        let version = self.table().version_column();
        for col in 0..self.table().columns().len() {
            if Some(col) == version {
                continue;
            }
            let Some(pos) = self.row.position_of(col) else {
                continue;
            };
            let current = self.row.value_at(pos);
            let stored = self.shadow.value_at(pos);
            let is_blob = self.table().columns()[col].data_type() == DataType::Blob;
            let differs = if is_blob && !self.row.dirty_at(pos) {
                false
            } else {
                current != stored
            };
            if differs {
                mask |= 1 << col;
                params.push(current.clone());
            }
        }
        (mask, params)
    }
}
