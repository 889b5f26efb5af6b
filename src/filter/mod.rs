//! # Per-Field Filters
//!
//! Filter storage for one cursor: at most one resolved filter per field.
//! Setting a new filter for a field replaces whatever was there; filter
//! state on one field is never affected by mutations to another field.
//!
//! ## Pattern grammar
//!
//! `set_pattern` accepts a small range-string grammar resolved against the
//! column type:
//!
//! - `22`: a single value, parsed by column type, equivalent to an exact
//!   filter
//! - `10..20`, `10..`, `..20`: an inclusive range, either bound may be
//!   omitted for an open end
//! - `ab*`, `a?c`: wildcard match, text columns only (`*` any run, `?` one
//!   character)
//!
//! Resolution happens at set time so the derived query shape is stable: two
//! filter states with the same resolved form render the same shape.

pub mod expr;

use crate::error::CursorError;
use crate::schema::ColumnDef;
use crate::types::{DataType, OwnedValue};
use eyre::Result;
use hashbrown::HashMap;

/// A resolved per-field filter.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFilter {
    Eq(OwnedValue),
    Range {
        lo: Option<OwnedValue>,
        hi: Option<OwnedValue>,
    },
    Like(String),
}

/// Structural classification of a filter, without its bound values.
///
/// Replacing a filter with one of the same shape keeps cached statements
/// valid: only the bound parameters change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterShape {
    Eq,
    Range { has_lo: bool, has_hi: bool },
    Like,
}

impl ResolvedFilter {
    pub fn shape(&self) -> FilterShape {
        match self {
            ResolvedFilter::Eq(_) => FilterShape::Eq,
            ResolvedFilter::Range { lo, hi } => FilterShape::Range {
                has_lo: lo.is_some(),
                has_hi: hi.is_some(),
            },
            ResolvedFilter::Like(_) => FilterShape::Like,
        }
    }

    /// Parameter values in the order the statement expects them.
    pub fn params(&self, out: &mut Vec<OwnedValue>) {
        match self {
            ResolvedFilter::Eq(v) => out.push(v.clone()),
            ResolvedFilter::Range { lo, hi } => {
                if let Some(lo) = lo {
                    out.push(lo.clone());
                }
                if let Some(hi) = hi {
                    out.push(hi.clone());
                }
            }
            ResolvedFilter::Like(p) => out.push(OwnedValue::Text(p.clone())),
        }
    }
}

/// The outcome of a filter mutation, as seen by the statement cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeEffect {
    /// The structural shape is unchanged; cached statements stay valid and
    /// only parameters rebind.
    Rebind,
    /// The shape changed; dependent cached statements must be rebuilt.
    Rebuild,
    /// Nothing changed at all (clearing an absent filter).
    None,
}

/// Per-field filter map, keyed by table column index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    by_column: HashMap<usize, ResolvedFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<&ResolvedFilter> {
        self.by_column.get(&column)
    }

    /// Installs `filter` for `column`, replacing any previous filter there,
    /// and reports whether dependent statements survive.
    pub fn set(&mut self, column: usize, filter: ResolvedFilter) -> ShapeEffect {
        let effect = match self.by_column.get(&column) {
            Some(old) if old.shape() == filter.shape() => ShapeEffect::Rebind,
            _ => ShapeEffect::Rebuild,
        };
        self.by_column.insert(column, filter);
        effect
    }

    pub fn clear(&mut self, column: usize) -> ShapeEffect {
        if self.by_column.remove(&column).is_some() {
            ShapeEffect::Rebuild
        } else {
            ShapeEffect::None
        }
    }

    pub fn clear_all(&mut self) -> ShapeEffect {
        if self.by_column.is_empty() {
            ShapeEffect::None
        } else {
            self.by_column.clear();
            ShapeEffect::Rebuild
        }
    }

    /// Filters in ascending column order. Shape building iterates this so
    /// logically identical filter states produce identical shapes no matter
    /// the mutation order.
    pub fn ordered(&self) -> Vec<(usize, &ResolvedFilter)> {
        let mut entries: Vec<_> = self.by_column.iter().map(|(c, f)| (*c, f)).collect();
        entries.sort_by_key(|(c, _)| *c);
        entries
    }

    /// Owned snapshot in ascending column order, for correlation partners.
    pub fn snapshot(&self) -> Vec<(usize, ResolvedFilter)> {
        self.ordered()
            .into_iter()
            .map(|(c, f)| (c, f.clone()))
            .collect()
    }
}

/// Resolves pattern text against a column per the grammar above.
pub fn resolve_pattern(text: &str, column: &ColumnDef) -> Result<ResolvedFilter> {
    if let Some((lo, hi)) = text.split_once("..") {
        let lo = if lo.is_empty() {
            None
        } else {
            Some(parse_scalar(lo, column)?)
        };
        let hi = if hi.is_empty() {
            None
        } else {
            Some(parse_scalar(hi, column)?)
        };
        if lo.is_none() && hi.is_none() {
            return Err(CursorError::Validation(format!(
                "empty range pattern for column {:?}",
                column.name()
            ))
            .into());
        }
        return Ok(ResolvedFilter::Range { lo, hi });
    }
    if text.contains('*') || text.contains('?') {
        if !column.data_type().is_text() {
            return Err(CursorError::Validation(format!(
                "wildcard pattern on non-text column {:?}",
                column.name()
            ))
            .into());
        }
        return Ok(ResolvedFilter::Like(text.to_string()));
    }
    Ok(ResolvedFilter::Eq(parse_scalar(text, column)?))
}

fn parse_scalar(text: &str, column: &ColumnDef) -> Result<OwnedValue> {
    let ty = column.data_type();
    let parsed = match ty {
        DataType::Bool => text.parse::<bool>().ok().map(OwnedValue::Bool),
        DataType::Int2 | DataType::Int4 | DataType::Int8 => {
            text.parse::<i64>().ok().map(OwnedValue::Int)
        }
        DataType::Float8 => text.parse::<f64>().ok().map(OwnedValue::Float),
        DataType::Text => Some(OwnedValue::Text(text.to_string())),
        DataType::Date | DataType::Timestamp => {
            text.parse::<i64>().ok().map(OwnedValue::Timestamp)
        }
        DataType::Blob => None,
    };
    parsed.ok_or_else(|| {
        CursorError::Validation(format!(
            "cannot parse {:?} for column {:?} of type {:?}",
            text,
            column.name(),
            ty
        ))
        .into()
    })
}

/// Wildcard match: `*` any run of characters, `?` exactly one.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some((&'*', rest)) => (0..=t.len()).any(|skip| inner(rest, &t[skip..])),
            Some((&'?', rest)) => t.split_first().is_some_and(|(_, tr)| inner(rest, tr)),
            Some((c, rest)) => t.split_first().is_some_and(|(tc, tr)| tc == c && inner(rest, tr)),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    inner(&p, &t)
}
