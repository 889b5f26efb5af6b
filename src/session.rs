//! # Sessions
//!
//! A session binds a backend connection and an access policy, and every
//! cursor is bound to exactly one session for its entire lifetime. All
//! operations are synchronous and blocking on the underlying call; the
//! single-thread-per-cursor discipline documented on [`Cursor`] applies to
//! the session as well.
//!
//! The session enforces an upper bound on simultaneously open cursors to
//! catch resource leaks in calling code. Exceeding the bound is a fatal
//! configuration error, not a retry condition. Closing a session flips a
//! flag every subsequent cursor operation checks, which is the bulk
//! teardown path: cursors themselves release their statements on drop.
//!
//! [`Cursor`]: crate::cursor::Cursor

use crate::backend::{AccessPolicy, Action, AllowAll, SqlBackend};
use crate::config::MAX_OPEN_CURSORS;
use crate::error::CursorError;
use eyre::{ensure, Result};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

pub struct Session {
    backend: Arc<dyn SqlBackend>,
    policy: Arc<dyn AccessPolicy>,
    open_cursors: Cell<usize>,
    max_open_cursors: usize,
    closed: Cell<bool>,
}

impl Session {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Rc<Self> {
        Self::with_policy(backend, Arc::new(AllowAll))
    }

    pub fn with_policy(backend: Arc<dyn SqlBackend>, policy: Arc<dyn AccessPolicy>) -> Rc<Self> {
        Rc::new(Self {
            backend,
            policy,
            open_cursors: Cell::new(0),
            max_open_cursors: MAX_OPEN_CURSORS,
            closed: Cell::new(false),
        })
    }

    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    pub fn is_allowed(&self, object: &str, action: Action) -> bool {
        self.policy.is_allowed(object, action)
    }

    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        self.backend.commit()
    }

    pub fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        self.backend.rollback()
    }

    /// Marks the session closed. Best-effort and idempotent; open cursors
    /// fail their next operation with `ClosedResourceError` and release
    /// their statements on drop.
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(CursorError::ClosedResource("session").into());
        }
        Ok(())
    }

    pub(crate) fn register_cursor(&self) -> Result<()> {
        self.ensure_open()?;
        let open = self.open_cursors.get();
        ensure!(
            open < self.max_open_cursors,
            "cursor leak: session already has {} open cursors (limit {})",
            open,
            self.max_open_cursors
        );
        self.open_cursors.set(open + 1);
        Ok(())
    }

    pub(crate) fn release_cursor(&self) {
        let open = self.open_cursors.get();
        self.open_cursors.set(open.saturating_sub(1));
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open_cursors", &self.open_cursors.get())
            .field("closed", &self.closed.get())
            .finish()
    }
}
