//! # Statement Shapes
//!
//! The structured, dialect-agnostic statement description handed to the SQL
//! backend. A shape captures everything structural about a query (which
//! predicates exist, in which fixed order, which columns are projected, how
//! the set is ordered and windowed) but not the values bound to the
//! predicates. Two cursor states with the same shape can share one prepared
//! statement and differ only in bound parameters.
//!
//! WHERE fragments are assembled in a fixed order: per-field filters (in
//! ascending column order), then the complex filter expression, then the
//! correlated in-filters, all joined with AND. The fixed order is what makes
//! logically identical filter states structurally identical.
//!
//! ## Parameter convention
//!
//! Parameters are positional. For every statement the field-filter
//! parameters come first, following the predicate list order (an equality
//! takes one, a range takes one per present bound, a wildcard takes the
//! pattern). After them:
//!
//! - `Forward`/`Backward`/`Stay`/`PositionCount`: the anchor ordering-key
//!   values, one per order column
//! - `GetByKey`: the primary-key values in key order
//! - `Insert`: the values of the present columns, ascending column order
//! - `Update`: the changed-column values (ascending column order), then the
//!   primary-key values, and the expected version token last
//! - `Delete`: the primary-key values, then the expected version token
//!
//! Correlated filters carry their partner's filter state by value inside
//! the shape; a partner filter change therefore changes the shape, which is
//! exactly why partner mutations must invalidate dependent statements.

use crate::filter::expr::ResolvedExpr;
use crate::filter::{FilterSet, ResolvedFilter};
use crate::query::order::OrderSpec;

/// Structural form of one per-field predicate; values arrive as parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateShape {
    Eq { column: usize },
    Range { column: usize, has_lo: bool, has_hi: bool },
    Like { column: usize },
}

impl PredicateShape {
    pub fn from_filter(column: usize, filter: &ResolvedFilter) -> Self {
        match filter {
            ResolvedFilter::Eq(_) => PredicateShape::Eq { column },
            ResolvedFilter::Range { lo, hi } => PredicateShape::Range {
                column,
                has_lo: lo.is_some(),
                has_hi: hi.is_some(),
            },
            ResolvedFilter::Like(_) => PredicateShape::Like { column },
        }
    }
}

/// A partner cursor's filter state, embedded by value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorrelatedWhere {
    /// `(partner column, filter)` in ascending column order, values included.
    pub predicates: Vec<(usize, ResolvedFilter)>,
    pub complex: Option<ResolvedExpr>,
    /// The partner's own correlations, expanded recursively.
    pub nested: Vec<CorrelatedSpec>,
}

/// One correlated in-filter: rows of this cursor are restricted to those
/// whose paired columns match some row of the partner's filtered set.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedSpec {
    pub partner_table: String,
    /// `(this column, partner column)` pairs, in the order they were added.
    pub pairs: Vec<(usize, usize)>,
    pub filter: CorrelatedWhere,
}

/// What kind of statement a shape describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// First row of the windowed, filtered, ordered set.
    First,
    /// Last row of the windowed set.
    Last,
    /// Rows strictly after the anchor key, skipping `skip` of them.
    Forward,
    /// Rows strictly before the anchor key, skipping `skip`, nearest first.
    Backward,
    /// Re-fetch of the row whose full ordering key equals the anchor.
    Stay,
    /// Exact-key fetch by primary key.
    GetByKey,
    /// Row count of the filtered set (window ignored).
    Count,
    /// Count of rows strictly before the anchor key in the filtered set.
    PositionCount,
    /// Insert with a column-presence bitmask (bit i = column i supplied).
    Insert { presence: u64 },
    /// Update of the masked columns with a version precondition when the
    /// table is versioned.
    Update { mask: u64, versioned: bool },
    /// Delete by key, with version precondition when versioned.
    Delete { versioned: bool },
    /// Delete every row matching the current filter shape.
    DeleteSet,
}

/// Complete structured statement description.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementSpec {
    pub kind: StatementKind,
    pub table: String,
    /// Projected column indices, in projection order. Always includes the
    /// primary key.
    pub projection: Vec<usize>,
    pub predicates: Vec<PredicateShape>,
    pub complex: Option<ResolvedExpr>,
    pub correlated: Vec<CorrelatedSpec>,
    /// `(column, descending)` in effective order.
    pub order: Vec<(usize, bool)>,
    /// Window start within the filtered, ordered set.
    pub offset: u64,
    /// Window size; 0 means unbounded.
    pub limit: u64,
    /// Rows to pass over beyond the anchor for Forward/Backward.
    pub skip: u64,
}

/// Assembles statement specs from one cursor's current state.
pub struct ShapeBuilder<'a> {
    pub table: &'a str,
    pub projection: &'a [usize],
    pub filters: &'a FilterSet,
    pub complex: Option<&'a ResolvedExpr>,
    pub correlated: Vec<CorrelatedSpec>,
    pub order: &'a OrderSpec,
    pub offset: u64,
    pub limit: u64,
    pub skip: u64,
}

impl<'a> ShapeBuilder<'a> {
    pub fn spec(&self, kind: StatementKind) -> StatementSpec {
        let skip = match kind {
            StatementKind::Forward | StatementKind::Backward => self.skip,
            _ => 0,
        };
        StatementSpec {
            kind,
            table: self.table.to_string(),
            projection: self.projection.to_vec(),
            predicates: self
                .filters
                .ordered()
                .into_iter()
                .map(|(c, f)| PredicateShape::from_filter(c, f))
                .collect(),
            complex: self.complex.cloned(),
            correlated: self.correlated.clone(),
            order: self.order.spec_keys(),
            offset: self.offset,
            limit: self.limit,
            skip,
        }
    }
}
