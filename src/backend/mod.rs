//! # Backend Collaborator Interfaces
//!
//! The cursor engine is database-dialect agnostic: it never renders SQL
//! text. Everything dialect-specific is consumed through the traits in this
//! module.
//!
//! - [`SqlBackend`]: turns a [`StatementSpec`] into an executable
//!   [`PreparedStatement`] and owns commit/rollback. Also the schema
//!   metadata source (`table_def`).
//! - [`PreparedStatement`]: a compiled statement executed repeatedly with
//!   positional parameters. The cursor's statement cache keeps these alive
//!   across repeated navigation of the same shape; the parameter order is
//!   documented on [`StatementSpec`](crate::query::shape::StatementSpec).
//! - [`AccessPolicy`]: per-action permission evaluation, checked by the
//!   cursor before every reading or mutating operation.
//! - [`CursorHooks`]: pre/post insert/update/delete dispatch. Hook failures
//!   propagate as errors of the triggering operation.
//!
//! Backends signal optimistic-concurrency conflicts and duplicate keys with
//! [`BackendRejection`](crate::error::BackendRejection) inside the error
//! report; the cursor pattern-matches the rejection and re-raises it with
//! record-identifying context.
//!
//! Ordering of NULLs is a dialect decision. The reference
//! [`memory`](crate::backend::memory) backend sorts NULL before every
//! non-NULL value in ascending order.
//!
//! Cancellation and timeouts are entirely the transport's concern; nothing
//! here defines a cancellation primitive.

pub mod memory;

use crate::cursor::RowBuffer;
use crate::query::shape::StatementSpec;
use crate::schema::TableDef;
use crate::types::OwnedValue;
use eyre::Result;
use std::sync::Arc;

/// Actions subject to permission evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Insert,
    Modify,
    Delete,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Read => "Read",
            Action::Insert => "Insert",
            Action::Modify => "Modify",
            Action::Delete => "Delete",
        }
    }
}

/// Result of executing a prepared statement.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    /// Result rows in projection order. Write statements return the stored
    /// row (server-generated keys and version included) as a single
    /// read-back row.
    pub rows: Vec<Vec<OwnedValue>>,
    /// Rows affected by a write statement.
    pub affected: u64,
}

/// A compiled statement bound to one shape, executed with positional
/// parameters.
pub trait PreparedStatement {
    fn execute(&mut self, params: &[OwnedValue]) -> Result<ExecOutcome>;
}

/// The executable query surface plus schema metadata and transaction
/// boundaries. One backend instance may serve many sessions.
pub trait SqlBackend {
    fn table_def(&self, name: &str) -> Result<Arc<TableDef>>;

    /// Builds a ready-to-bind statement for the given shape. Called once per
    /// distinct shape; the cursor caches the result.
    fn prepare(&self, table: &TableDef, spec: &StatementSpec) -> Result<Box<dyn PreparedStatement>>;

    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

/// Permission evaluation for a session's schema objects.
pub trait AccessPolicy {
    fn is_allowed(&self, object: &str, action: Action) -> bool;
}

/// Policy that allows everything; the default for new sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn is_allowed(&self, _object: &str, _action: Action) -> bool {
        true
    }
}

/// Lifecycle hooks dispatched around cursor writes. The row buffer carries
/// the new values; update hooks additionally receive the shadow buffer with
/// the last stored state of the same logical row.
#[allow(unused_variables)]
pub trait CursorHooks {
    fn before_insert(&self, row: &RowBuffer) -> Result<()> {
        Ok(())
    }
    fn after_insert(&self, row: &RowBuffer) -> Result<()> {
        Ok(())
    }
    fn before_update(&self, old: &RowBuffer, new: &RowBuffer) -> Result<()> {
        Ok(())
    }
    fn after_update(&self, old: &RowBuffer, new: &RowBuffer) -> Result<()> {
        Ok(())
    }
    fn before_delete(&self, row: &RowBuffer) -> Result<()> {
        Ok(())
    }
    fn after_delete(&self, row: &RowBuffer) -> Result<()> {
        Ok(())
    }
}
