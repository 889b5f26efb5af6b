//! # Prepared Statement Cache
//!
//! One lazily built prepared statement per statement slot. Each navigation
//! direction gets its own slot because each requires a structurally
//! different ORDER/LIMIT/comparison shape; insert and update statements are
//! keyed by their column masks.
//!
//! Invalidation is selective:
//!
//! - shape-affecting mutations (filters, order, pagination, correlations)
//!   release the navigation slots and the set-delete statement,
//! - changing the navigation skip releases only the forward/backward pair,
//! - `release_all` drops everything and is invoked on cursor teardown.
//!
//! All release operations are idempotent; releasing an empty cache is a
//! no-op, never an error.

use crate::backend::PreparedStatement;
use eyre::{eyre, Result};
use hashbrown::HashMap;

/// Statement slots, one per structurally distinct operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementSlot {
    First,
    Last,
    Forward,
    Backward,
    Stay,
    Count,
    Position,
    GetByKey,
    Delete,
    DeleteSet,
}

const SLOT_COUNT: usize = 10;

impl StatementSlot {
    fn index(self) -> usize {
        match self {
            StatementSlot::First => 0,
            StatementSlot::Last => 1,
            StatementSlot::Forward => 2,
            StatementSlot::Backward => 3,
            StatementSlot::Stay => 4,
            StatementSlot::Count => 5,
            StatementSlot::Position => 6,
            StatementSlot::GetByKey => 7,
            StatementSlot::Delete => 8,
            StatementSlot::DeleteSet => 9,
        }
    }

    /// Slots whose statement text depends on the filter/order/window shape.
    fn is_shape_dependent(self) -> bool {
        !matches!(
            self,
            StatementSlot::GetByKey | StatementSlot::Delete
        )
    }
}

#[derive(Default)]
pub struct StatementCache {
    slots: [Option<Box<dyn PreparedStatement>>; SLOT_COUNT],
    inserts: HashMap<u64, Box<dyn PreparedStatement>>,
    updates: HashMap<u64, Box<dyn PreparedStatement>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached statement for `slot`, building it on first use.
    pub fn get_or_build(
        &mut self,
        slot: StatementSlot,
        build: impl FnOnce() -> Result<Box<dyn PreparedStatement>>,
    ) -> Result<&mut dyn PreparedStatement> {
        let entry = &mut self.slots[slot.index()];
        if entry.is_none() {
            *entry = Some(build()?);
        }
        match entry {
            Some(s) => Ok(s.as_mut()),
            None => Err(eyre!("statement slot {:?} empty after build", slot)),
        }
    }

    pub fn get_or_build_insert(
        &mut self,
        presence: u64,
        build: impl FnOnce() -> Result<Box<dyn PreparedStatement>>,
    ) -> Result<&mut dyn PreparedStatement> {
        if !self.inserts.contains_key(&presence) {
            self.inserts.insert(presence, build()?);
        }
        match self.inserts.get_mut(&presence) {
            Some(s) => Ok(s.as_mut()),
            None => Err(eyre!("insert statement vanished for mask {presence:#x}")),
        }
    }

    pub fn get_or_build_update(
        &mut self,
        mask: u64,
        build: impl FnOnce() -> Result<Box<dyn PreparedStatement>>,
    ) -> Result<&mut dyn PreparedStatement> {
        if !self.updates.contains_key(&mask) {
            self.updates.insert(mask, build()?);
        }
        match self.updates.get_mut(&mask) {
            Some(s) => Ok(s.as_mut()),
            None => Err(eyre!("update statement vanished for mask {mask:#x}")),
        }
    }

    /// Releases every statement whose shape depends on filters, order, or
    /// the pagination window.
    pub fn release_shape_dependent(&mut self) {
        for slot in [
            StatementSlot::First,
            StatementSlot::Last,
            StatementSlot::Forward,
            StatementSlot::Backward,
            StatementSlot::Stay,
            StatementSlot::Count,
            StatementSlot::Position,
            StatementSlot::GetByKey,
            StatementSlot::Delete,
            StatementSlot::DeleteSet,
        ] {
            if slot.is_shape_dependent() {
                self.slots[slot.index()] = None;
            }
        }
    }

    /// Releases only the skip-aware forward/backward pair.
    pub fn release_navigation(&mut self) {
        self.slots[StatementSlot::Forward.index()] = None;
        self.slots[StatementSlot::Backward.index()] = None;
    }

    /// Releases everything. Safe to call repeatedly; used on teardown and
    /// on projection changes.
    pub fn release_all(&mut self) {
        for entry in &mut self.slots {
            *entry = None;
        }
        self.inserts.clear();
        self.updates.clear();
    }

    pub fn is_cached(&self, slot: StatementSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    #[cfg(test)]
    fn cached_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count() + self.inserts.len() + self.updates.len()
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field(
                "slots",
                &self.slots.iter().filter(|s| s.is_some()).count(),
            )
            .field("inserts", &self.inserts.len())
            .field("updates", &self.updates.len())
            .finish()
    }
}
