//! # Schema Metadata
//!
//! Table, column, and index definitions consumed by the cursor engine. This
//! is the narrow schema view of §6: column list and order, primary-key
//! column order, whether a column is auto-generated or carries the version
//! counter, and index definitions for fields-lookup validation.
//!
//! The engine never mutates schema objects; backends hand out shared
//! [`TableDef`] values and every cursor keeps a reference for the lifetime
//! of its statements.

use crate::types::DataType;
use smallvec::SmallVec;

/// A single typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    name: String,
    data_type: DataType,
    nullable: bool,
    auto_generate: bool,
    version_counter: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            auto_generate: false,
            version_counter: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as backend-generated on insert (identity column).
    pub fn auto_generate(mut self) -> Self {
        self.auto_generate = true;
        self
    }

    /// Marks the column as the optimistic-concurrency version counter.
    pub fn version_counter(mut self) -> Self {
        self.version_counter = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_auto_generate(&self) -> bool {
        self.auto_generate
    }

    pub fn is_version_counter(&self) -> bool {
        self.version_counter
    }
}

/// A named index over one or more columns, in index column order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    name: String,
    columns: Vec<String>,
    unique: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: Vec<impl Into<String>>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(|c| c.into()).collect(),
            unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// Table metadata: columns in storage order, primary-key column order,
/// secondary indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.primary_key = columns.into_iter().map(|c| c.into()).collect();
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Primary-key column positions in key order.
    pub fn pk_indices(&self) -> SmallVec<[usize; 4]> {
        self.primary_key
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect()
    }

    /// Position of the version-counter column, if the table is versioned.
    pub fn version_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_version_counter())
    }

    /// True when an index with exactly these columns, in this order, exists.
    /// The primary key counts as an index.
    pub fn has_index_on(&self, columns: &[String]) -> bool {
        if !self.primary_key.is_empty() && self.primary_key == columns {
            return true;
        }
        self.indexes.iter().any(|ix| ix.columns() == columns)
    }
}
