//! # Runtime Values and Column Types
//!
//! Owned value representation shared by cursors and backends. Values are
//! stored inline in enum variants; there is no boxing and no reference
//! counting at this level.
//!
//! ## Comparison Semantics
//!
//! Two comparison surfaces exist and must not be confused:
//!
//! - [`OwnedValue::compare`] follows SQL NULL semantics: NULL compared with
//!   anything (including NULL) is UNKNOWN and yields `None`. Integers and
//!   floats cross-compare numerically.
//! - [`OwnedValue::sort_cmp`] is the total order used for ORDER BY and
//!   ordering-key anchors: NULL sorts before every other value, mismatched
//!   type families order by a fixed tag rank. This keeps pagination anchors
//!   deterministic even over dirty data.

use std::cmp::Ordering;

/// Runtime value for a single column slot.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
}

/// Schema-level column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float8,
    Text,
    Blob,
    Date,
    Timestamp,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int2 | DataType::Int4 | DataType::Int8)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, DataType::Float8)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, DataType::Text)
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, DataType::Blob)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }
}

impl OwnedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, OwnedValue::Null)
    }

    /// SQL three-valued comparison. `None` means UNKNOWN (a NULL operand or
    /// incomparable type families).
    pub fn compare(&self, other: &OwnedValue) -> Option<Ordering> {
        use OwnedValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Blob(a), Blob(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            // Timestamps compare as their integer microsecond value.
            (Timestamp(a), Int(b)) => Some(a.cmp(b)),
            (Int(a), Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order for sorting: NULL first, then by type family rank, then
    /// by value. Never returns UNKNOWN.
    pub fn sort_cmp(&self, other: &OwnedValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        self.tag_rank().cmp(&other.tag_rank())
    }

    fn tag_rank(&self) -> u8 {
        match self {
            OwnedValue::Null => 0,
            OwnedValue::Bool(_) => 1,
            OwnedValue::Int(_) | OwnedValue::Float(_) => 2,
            OwnedValue::Timestamp(_) => 3,
            OwnedValue::Text(_) => 4,
            OwnedValue::Blob(_) => 5,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OwnedValue::Int(i) => Some(*i),
            OwnedValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OwnedValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for OwnedValue {
    fn from(v: i64) -> Self {
        OwnedValue::Int(v)
    }
}

impl From<i32> for OwnedValue {
    fn from(v: i32) -> Self {
        OwnedValue::Int(v as i64)
    }
}

impl From<f64> for OwnedValue {
    fn from(v: f64) -> Self {
        OwnedValue::Float(v)
    }
}

impl From<bool> for OwnedValue {
    fn from(v: bool) -> Self {
        OwnedValue::Bool(v)
    }
}

impl From<&str> for OwnedValue {
    fn from(v: &str) -> Self {
        OwnedValue::Text(v.to_string())
    }
}

impl From<String> for OwnedValue {
    fn from(v: String) -> Self {
        OwnedValue::Text(v)
    }
}

impl From<Vec<u8>> for OwnedValue {
    fn from(v: Vec<u8>) -> Self {
        OwnedValue::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_comparison_is_unknown() {
        assert_eq!(OwnedValue::Null.compare(&OwnedValue::Int(1)), None);
        assert_eq!(OwnedValue::Null.compare(&OwnedValue::Null), None);
    }

    #[test]
    fn int_float_cross_compare() {
        assert_eq!(
            OwnedValue::Int(42).compare(&OwnedValue::Float(3.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            OwnedValue::Float(2.0).compare(&OwnedValue::Int(2)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn sort_order_puts_null_first() {
        assert_eq!(
            OwnedValue::Null.sort_cmp(&OwnedValue::Int(i64::MIN)),
            Ordering::Less
        );
        assert_eq!(
            OwnedValue::Text("a".into()).sort_cmp(&OwnedValue::Null),
            Ordering::Greater
        );
    }

    #[test]
    fn sort_order_is_total_across_families() {
        // Mismatched families fall back to tag rank instead of panicking.
        assert_eq!(
            OwnedValue::Int(5).sort_cmp(&OwnedValue::Text("5".into())),
            Ordering::Less
        );
    }

    #[test]
    fn text_compares_lexicographically() {
        assert_eq!(
            OwnedValue::Text("abc".into()).compare(&OwnedValue::Text("abd".into())),
            Some(Ordering::Less)
        );
    }
}
