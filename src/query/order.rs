//! Ordering specification. User columns come first, in the order given;
//! primary-key columns not already present are appended ascending so the
//! effective order is always total and deterministic, which pagination
//! anchors and position interpolation depend on.

use crate::error::CursorError;
use crate::schema::TableDef;
use eyre::Result;
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub column: usize,
    pub name: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    keys: SmallVec<[OrderKey; 4]>,
}

impl OrderSpec {
    /// Builds the effective order from user-specified columns. Duplicate
    /// user columns and unknown columns are validation errors.
    pub fn new(table: &TableDef, user: &[(&str, bool)]) -> Result<Self> {
        let mut keys: SmallVec<[OrderKey; 4]> = SmallVec::new();
        for (name, descending) in user {
            let column = table.column_index(name).ok_or_else(|| {
                CursorError::Validation(format!(
                    "unknown order column {:?} on {}",
                    name,
                    table.name()
                ))
            })?;
            if keys.iter().any(|k| k.column == column) {
                return Err(CursorError::Validation(format!(
                    "duplicate order column {:?}",
                    name
                ))
                .into());
            }
            keys.push(OrderKey {
                column,
                name: (*name).to_string(),
                descending: *descending,
            });
        }
        for pk in table.primary_key() {
            let column = table.column_index(pk).ok_or_else(|| {
                CursorError::Validation(format!(
                    "primary key column {:?} missing from {}",
                    pk,
                    table.name()
                ))
            })?;
            if !keys.iter().any(|k| k.column == column) {
                keys.push(OrderKey {
                    column,
                    name: pk.clone(),
                    descending: false,
                });
            }
        }
        Ok(Self { keys })
    }

    /// Primary-key-only order, the default for a fresh cursor.
    pub fn pk_only(table: &TableDef) -> Result<Self> {
        Self::new(table, &[])
    }

    pub fn keys(&self) -> &[OrderKey] {
        &self.keys
    }

    pub fn column_names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.name.clone()).collect()
    }

    /// `(column, descending)` pairs for the statement description.
    pub fn spec_keys(&self) -> Vec<(usize, bool)> {
        self.keys.iter().map(|k| (k.column, k.descending)).collect()
    }
}
