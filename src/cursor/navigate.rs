//! Cursor navigation: edge positioning, directional stepping, command
//! strings, and batched set streaming.
//!
//! Directional steps are anchored on the current row's ordering-key values
//! rather than an absolute offset, so a step lands correctly even when rows
//! were inserted or deleted since the last read. A multi-row step compiles
//! the skip distance into the statement; changing the distance releases only
//! the forward/backward statement pair.

use super::{Cursor, NavState as State};
use crate::backend::Action;
use crate::error::CursorError;
use crate::query::cache::StatementSlot;
use crate::query::shape::StatementKind;
use crate::types::OwnedValue;
use eyre::Result;
use std::collections::VecDeque;

/// Positioning state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// No row loaded; the next directional step starts from the set edge.
    Unpositioned,
    /// A row is loaded in the row buffer.
    Positioned,
    /// A find sequence ran out of commands without landing on a row.
    Exhausted,
}

impl Cursor {
    pub fn nav_state(&self) -> NavState {
        self.state
    }

    pub fn is_positioned(&self) -> bool {
        self.state == State::Positioned
    }

    /// Positions on the first row of the filtered, ordered set. Returns
    /// `false` on an empty set, leaving position and buffers unchanged.
    pub fn first(&mut self) -> Result<bool> {
        self.edge(true)
    }

    /// Positions on the last row of the set.
    pub fn last(&mut self) -> Result<bool> {
        self.edge(false)
    }

    fn edge(&mut self, forward: bool) -> Result<bool> {
        self.check_permission(Action::Read)?;
        let (slot, kind) = if forward {
            (StatementSlot::First, StatementKind::First)
        } else {
            (StatementSlot::Last, StatementKind::Last)
        };
        let out = self.run_shape_slot(slot, kind, &[])?;
        Ok(match out.rows.into_iter().next() {
            Some(values) => {
                self.adopt_row(values);
                true
            }
            None => false,
        })
    }

    /// Steps to the next row in order. From an unpositioned cursor this is
    /// [`first`](Self::first). Returns `false` past the end of the set,
    /// leaving the current row loaded.
    pub fn next(&mut self) -> Result<bool> {
        self.advance(true, 1)
    }

    pub fn prev(&mut self) -> Result<bool> {
        self.advance(false, 1)
    }

    /// Steps `n` rows forward in one statement. `n == 0` is a no-op that
    /// reports whether the cursor is positioned.
    pub fn next_by(&mut self, n: i64) -> Result<bool> {
        self.stride(true, n)
    }

    pub fn prev_by(&mut self, n: i64) -> Result<bool> {
        self.stride(false, n)
    }

    fn stride(&mut self, forward: bool, n: i64) -> Result<bool> {
        if n < 0 {
            return Err(
                CursorError::Validation(format!("negative step distance {n}")).into(),
            );
        }
        if n == 0 {
            return Ok(self.is_positioned());
        }
        self.advance(forward, n as u64)
    }

    fn advance(&mut self, forward: bool, n: u64) -> Result<bool> {
        self.check_permission(Action::Read)?;
        let mut remaining = n;
        if self.state != State::Positioned {
            if !self.edge(forward)? {
                return Ok(false);
            }
            remaining -= 1;
            if remaining == 0 {
                return Ok(true);
            }
        }
        let skip = remaining - 1;
        if skip != self.nav_skip {
            self.nav_skip = skip;
            self.cache.release_navigation();
        }
        let anchor = self.anchor_params()?;
        let (slot, kind) = if forward {
            (StatementSlot::Forward, StatementKind::Forward)
        } else {
            (StatementSlot::Backward, StatementKind::Backward)
        };
        let out = self.run_shape_slot(slot, kind, &anchor)?;
        Ok(match out.rows.into_iter().next() {
            Some(values) => {
                self.adopt_row(values);
                true
            }
            None => false,
        })
    }

    /// Re-reads the current row in place. Returns `false` when the row no
    /// longer exists in the filtered set.
    pub fn refresh(&mut self) -> Result<bool> {
        self.check_permission(Action::Read)?;
        if self.state != State::Positioned {
            return Err(CursorError::Validation("cursor is not positioned".into()).into());
        }
        let anchor = self.anchor_params()?;
        let out = self.run_shape_slot(StatementSlot::Stay, StatementKind::Stay, &anchor)?;
        Ok(match out.rows.into_iter().next() {
            Some(values) => {
                self.adopt_row(values);
                true
            }
            None => false,
        })
    }

    /// Runs a command string left to right until one command lands on a
    /// row: `-` first, `+` last, `>` next, `<` prev, `=` re-read. The whole
    /// string is validated before anything executes. When every command
    /// misses the cursor becomes exhausted and `false` is returned.
    pub fn find(&mut self, commands: &str) -> Result<bool> {
        for c in commands.chars() {
            if !matches!(c, '-' | '+' | '>' | '<' | '=') {
                return Err(CursorError::Validation(format!(
                    "invalid find command {c:?} in {commands:?}"
                ))
                .into());
            }
        }
        for c in commands.chars() {
            let hit = match c {
                '-' => self.first()?,
                '+' => self.last()?,
                '>' => self.next()?,
                '<' => self.prev()?,
                '=' => {
                    if self.is_positioned() {
                        self.refresh()?
                    } else {
                        false
                    }
                }
                _ => unreachable!(),
            };
            if hit {
                return Ok(true);
            }
        }
        self.state = State::Exhausted;
        Ok(false)
    }

    /// [`find`](Self::find) that raises `RecordNotFound` when every command
    /// misses.
    pub fn find_strict(&mut self, commands: &str) -> Result<()> {
        if self.find(commands)? {
            Ok(())
        } else {
            Err(CursorError::RecordNotFound {
                object: self.table().name().to_string(),
            }
            .into())
        }
    }

    /// Forward step backed by a prefetched batch. Filter or correlation
    /// changes drop the batch, so a stale prefetch is never served.
    pub fn next_in_set(&mut self) -> Result<bool> {
        self.check_permission(Action::Read)?;
        self.flush_invalidation();
        if let Some(batch) = &mut self.stream {
            if let Some(values) = batch.pop_front() {
                self.adopt_row(values);
                return Ok(true);
            }
        }
        if self.state != State::Positioned {
            return self.first();
        }
        if self.nav_skip != 0 {
            self.nav_skip = 0;
            self.cache.release_navigation();
        }
        let anchor = self.anchor_params()?;
        let out =
            self.run_shape_slot(StatementSlot::Forward, StatementKind::Forward, &anchor)?;
        let mut batch: VecDeque<Vec<OwnedValue>> = out.rows.into();
        Ok(match batch.pop_front() {
            Some(values) => {
                self.stream = Some(batch);
                self.adopt_row(values);
                true
            }
            None => false,
        })
    }

    /// Drops position, buffers, and any prefetched batch. Filters, order,
    /// and cached statements survive.
    pub fn reset(&mut self) {
        self.row.clear();
        self.shadow.clear();
        self.stream = None;
        self.state = State::Unpositioned;
    }

    /// Iterates the filtered set from the top, yielding owned row values.
    pub fn iter_rows(&mut self) -> RowIter<'_> {
        RowIter {
            cursor: self,
            started: false,
            done: false,
        }
    }
}

/// Owned-row iterator over a cursor's filtered set; see
/// [`Cursor::iter_rows`]. The first `next` positions on the first row, so
/// iteration always starts from the top regardless of prior navigation.
pub struct RowIter<'a> {
    cursor: &'a mut Cursor,
    started: bool,
    done: bool,
}

impl Iterator for RowIter<'_> {
    type Item = Result<Vec<OwnedValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = if self.started {
            self.cursor.next_in_set()
        } else {
            self.started = true;
            self.cursor.reset();
            self.cursor.next_in_set()
        };
        match step {
            Ok(true) => Some(Ok(self.cursor.row.values().to_vec())),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
