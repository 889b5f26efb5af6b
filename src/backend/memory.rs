//! # In-Memory Reference Backend
//!
//! A complete [`SqlBackend`] implementation over plain vectors, used by the
//! integration tests and as the executable reference for the statement
//! contract: parameter order, window handling, anchor comparison, NULL
//! placement, version preconditions, and auto-generated keys all behave
//! here exactly as the trait documentation describes.
//!
//! Rows live in an `Arc<RwLock<_>>` shared by every statement prepared from
//! the same backend, so several sessions over one backend observe each
//! other's committed writes; the optimistic-concurrency tests depend on
//! that.
//!
//! This backend auto-commits: `commit`/`rollback` are accepted and do
//! nothing. Statement preparation is counted, letting tests assert that
//! shape-preserving filter changes reuse cached statements instead of
//! re-preparing.

use crate::config::STREAM_BATCH_SIZE;
use crate::error::BackendRejection;
use crate::filter::expr::{self, ResolvedExpr};
use crate::filter::{wildcard_match, ResolvedFilter};
use crate::query::shape::{
    CorrelatedSpec, PredicateShape, StatementKind, StatementSpec,
};
use crate::schema::TableDef;
use crate::types::OwnedValue;
use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::{ExecOutcome, PreparedStatement, SqlBackend};

#[derive(Debug)]
struct StoredTable {
    def: Arc<TableDef>,
    rows: Vec<Vec<OwnedValue>>,
    next_auto: i64,
}

#[derive(Debug, Default)]
struct BackendState {
    tables: HashMap<String, StoredTable>,
}

/// Shared in-memory storage implementing the backend traits.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<BackendState>>,
    prepares: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, def: TableDef) {
        let mut state = self.state.write();
        state.tables.insert(
            def.name().to_string(),
            StoredTable {
                def: Arc::new(def),
                rows: Vec::new(),
                next_auto: 1,
            },
        );
    }

    /// Seeds rows directly, bypassing the cursor protocol. Values must be in
    /// table column order.
    pub fn load_rows(&self, table: &str, rows: Vec<Vec<OwnedValue>>) -> Result<()> {
        let mut state = self.state.write();
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| eyre::eyre!("no such table {table:?}"))?;
        for row in &rows {
            ensure!(
                row.len() == stored.def.columns().len(),
                "row width {} does not match table {:?}",
                row.len(),
                table
            );
        }
        for row in rows {
            bump_auto(stored, &row);
            stored.rows.push(row);
        }
        Ok(())
    }

    /// Snapshot of a table's rows, for test assertions.
    pub fn rows(&self, table: &str) -> Vec<Vec<OwnedValue>> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of statements prepared so far.
    pub fn prepare_count(&self) -> u64 {
        self.prepares.load(AtomicOrdering::Relaxed)
    }
}

impl SqlBackend for MemoryBackend {
    fn table_def(&self, name: &str) -> Result<Arc<TableDef>> {
        self.state
            .read()
            .tables
            .get(name)
            .map(|t| Arc::clone(&t.def))
            .ok_or_else(|| eyre::eyre!("no such table {name:?}"))
    }

    fn prepare(&self, table: &TableDef, spec: &StatementSpec) -> Result<Box<dyn PreparedStatement>> {
        ensure!(
            spec.table == table.name(),
            "statement table {:?} does not match handle {:?}",
            spec.table,
            table.name()
        );
        self.prepares.fetch_add(1, AtomicOrdering::Relaxed);
        tracing::debug!(table = %spec.table, kind = ?spec.kind, "prepare statement");
        Ok(Box::new(MemoryStatement {
            state: Arc::clone(&self.state),
            spec: spec.clone(),
        }))
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryStatement {
    state: Arc<RwLock<BackendState>>,
    spec: StatementSpec,
}

/// A per-field predicate with its parameter values bound.
struct BoundPredicate<'a> {
    shape: &'a PredicateShape,
    values: Vec<&'a OwnedValue>,
}

impl BoundPredicate<'_> {
    fn matches(&self, row: &[OwnedValue]) -> bool {
        match self.shape {
            PredicateShape::Eq { column } => cmp_eq(&row[*column], self.values[0]),
            PredicateShape::Range { column, has_lo, has_hi } => {
                let v = &row[*column];
                let mut idx = 0;
                if *has_lo {
                    let lo = self.values[idx];
                    idx += 1;
                    match v.compare(lo) {
                        Some(Ordering::Less) | None => return false,
                        _ => {}
                    }
                }
                if *has_hi {
                    let hi = self.values[idx];
                    match v.compare(hi) {
                        Some(Ordering::Greater) | None => return false,
                        _ => {}
                    }
                }
                true
            }
            PredicateShape::Like { column } => match (&row[*column], self.values[0]) {
                (OwnedValue::Text(t), OwnedValue::Text(p)) => wildcard_match(p, t),
                _ => false,
            },
        }
    }
}

fn cmp_eq(a: &OwnedValue, b: &OwnedValue) -> bool {
    matches!(a.compare(b), Some(Ordering::Equal))
}

fn param_arity(shape: &PredicateShape) -> usize {
    match shape {
        PredicateShape::Eq { .. } | PredicateShape::Like { .. } => 1,
        PredicateShape::Range { has_lo, has_hi, .. } => {
            usize::from(*has_lo) + usize::from(*has_hi)
        }
    }
}

/// Splits positional params into per-predicate bindings and the trailing
/// remainder (anchor, key, or write values).
fn bind_predicates<'a>(
    shapes: &'a [PredicateShape],
    params: &'a [OwnedValue],
) -> Result<(Vec<BoundPredicate<'a>>, &'a [OwnedValue])> {
    let mut bound = Vec::with_capacity(shapes.len());
    let mut cursor = 0;
    for shape in shapes {
        let arity = param_arity(shape);
        ensure!(
            cursor + arity <= params.len(),
            "too few parameters: need {} more for {:?}",
            arity,
            shape
        );
        bound.push(BoundPredicate {
            shape,
            values: params[cursor..cursor + arity].iter().collect(),
        });
        cursor += arity;
    }
    Ok((bound, &params[cursor..]))
}

/// Evaluates a correlated in-filter: the row's paired columns must match
/// some row of the partner's filtered set. Partner filter values are
/// embedded in the spec, so no parameters are consumed here.
fn correlated_matches(
    state: &BackendState,
    row: &[OwnedValue],
    corr: &CorrelatedSpec,
) -> Result<bool> {
    let Some(partner) = state.tables.get(&corr.partner_table) else {
        bail!("correlated partner table {:?} missing", corr.partner_table);
    };
    for partner_row in &partner.rows {
        if !embedded_where_matches(state, partner_row, corr)? {
            continue;
        }
        let all_equal = corr
            .pairs
            .iter()
            .all(|(this_col, partner_col)| cmp_eq(&row[*this_col], &partner_row[*partner_col]));
        if all_equal {
            return Ok(true);
        }
    }
    Ok(false)
}

fn embedded_where_matches(
    state: &BackendState,
    row: &[OwnedValue],
    corr: &CorrelatedSpec,
) -> Result<bool> {
    for (column, filter) in &corr.filter.predicates {
        let ok = match filter {
            ResolvedFilter::Eq(v) => cmp_eq(&row[*column], v),
            ResolvedFilter::Range { lo, hi } => {
                let v = &row[*column];
                let lo_ok = lo
                    .as_ref()
                    .map_or(true, |lo| matches!(v.compare(lo), Some(o) if o != Ordering::Less));
                let hi_ok = hi
                    .as_ref()
                    .map_or(true, |hi| matches!(v.compare(hi), Some(o) if o != Ordering::Greater));
                lo_ok && hi_ok
            }
            ResolvedFilter::Like(p) => match &row[*column] {
                OwnedValue::Text(t) => wildcard_match(p, t),
                _ => false,
            },
        };
        if !ok {
            return Ok(false);
        }
    }
    if let Some(complex) = &corr.filter.complex {
        if expr::eval(complex, row) != Some(true) {
            return Ok(false);
        }
    }
    for nested in &corr.filter.nested {
        if !correlated_matches(state, row, nested)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn row_matches(
    state: &BackendState,
    row: &[OwnedValue],
    predicates: &[BoundPredicate<'_>],
    complex: Option<&ResolvedExpr>,
    correlated: &[CorrelatedSpec],
) -> Result<bool> {
    for pred in predicates {
        if !pred.matches(row) {
            return Ok(false);
        }
    }
    if let Some(complex) = complex {
        if expr::eval(complex, row) != Some(true) {
            return Ok(false);
        }
    }
    for corr in correlated {
        if !correlated_matches(state, row, corr)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compares two rows on the ordering keys, honoring per-key direction.
/// NULL sorts before every non-NULL value in ascending order.
fn order_cmp(a: &[OwnedValue], b: &[OwnedValue], order: &[(usize, bool)]) -> Ordering {
    for (column, descending) in order {
        let ord = a[*column].sort_cmp(&b[*column]);
        let ord = if *descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compares a row against anchor key values given in effective order.
fn anchor_cmp(row: &[OwnedValue], anchor: &[OwnedValue], order: &[(usize, bool)]) -> Ordering {
    for (i, (column, descending)) in order.iter().enumerate() {
        let ord = row[*column].sort_cmp(&anchor[i]);
        let ord = if *descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn project(row: &[OwnedValue], projection: &[usize]) -> Vec<OwnedValue> {
    projection.iter().map(|i| row[*i].clone()).collect()
}

fn bump_auto(table: &mut StoredTable, row: &[OwnedValue]) {
    let Some(auto_col) = table
        .def
        .columns()
        .iter()
        .position(|c| c.is_auto_generate())
    else {
        return;
    };
    if let Some(OwnedValue::Int(v)) = row.get(auto_col) {
        if *v >= table.next_auto {
            table.next_auto = v + 1;
        }
    }
}

impl MemoryStatement {
    /// Indices of matching rows in the effective order, before windowing.
    fn ordered_matches(
        &self,
        state: &BackendState,
        table: &StoredTable,
        predicates: &[BoundPredicate<'_>],
    ) -> Result<Vec<usize>> {
        let mut hits = Vec::new();
        for (i, row) in table.rows.iter().enumerate() {
            if row_matches(
                state,
                row,
                predicates,
                self.spec.complex.as_ref(),
                &self.spec.correlated,
            )? {
                hits.push(i);
            }
        }
        hits.sort_by(|a, b| order_cmp(&table.rows[*a], &table.rows[*b], &self.spec.order));
        Ok(hits)
    }

    fn window<'a>(&self, view: &'a [usize]) -> &'a [usize] {
        let start = (self.spec.offset as usize).min(view.len());
        let rest = &view[start..];
        if self.spec.limit > 0 {
            &rest[..(self.spec.limit as usize).min(rest.len())]
        } else {
            rest
        }
    }

    fn find_by_key(&self, table: &StoredTable, key: &[OwnedValue]) -> Result<Option<usize>> {
        let pk = table.def.pk_indices();
        ensure!(
            key.len() == pk.len(),
            "key arity {} does not match primary key of {:?}",
            key.len(),
            table.def.name()
        );
        Ok(table.rows.iter().position(|row| {
            pk.iter()
                .zip(key.iter())
                .all(|(col, val)| cmp_eq(&row[*col], val))
        }))
    }
}

impl PreparedStatement for MemoryStatement {
    fn execute(&mut self, params: &[OwnedValue]) -> Result<ExecOutcome> {
        let mut state = self.state.write();
        let spec = self.spec.clone();
        let (predicates, rest) = bind_predicates(&spec.predicates, params)?;

        // Reads borrow the table immutably through the locked state.
        macro_rules! table_ref {
            () => {
                state
                    .tables
                    .get(&spec.table)
                    .ok_or_else(|| eyre::eyre!("no such table {:?}", spec.table))?
            };
        }

        match spec.kind {
            StatementKind::First | StatementKind::Last => {
                let table = table_ref!();
                let view = self.ordered_matches(&state, table, &predicates)?;
                let window = self.window(&view);
                let picked = match spec.kind {
                    StatementKind::First => window.first(),
                    _ => window.last(),
                };
                Ok(ExecOutcome {
                    rows: picked
                        .map(|i| project(&table.rows[*i], &spec.projection))
                        .into_iter()
                        .collect(),
                    affected: 0,
                })
            }
            StatementKind::Forward | StatementKind::Backward => {
                let anchor = rest;
                ensure!(
                    anchor.len() == spec.order.len(),
                    "anchor arity {} does not match order keys",
                    anchor.len()
                );
                let table = table_ref!();
                let view = self.ordered_matches(&state, table, &predicates)?;
                let window = self.window(&view);
                let mut out: Vec<&[OwnedValue]> = Vec::new();
                let forward = spec.kind == StatementKind::Forward;
                let iter: Box<dyn Iterator<Item = &usize>> = if forward {
                    Box::new(window.iter())
                } else {
                    Box::new(window.iter().rev())
                };
                for i in iter {
                    let row = &table.rows[*i];
                    let ord = anchor_cmp(row, anchor, &spec.order);
                    let beyond = if forward {
                        ord == Ordering::Greater
                    } else {
                        ord == Ordering::Less
                    };
                    if beyond {
                        out.push(row);
                    }
                }
                // An unbounded directional fetch still returns at most one
                // streaming batch per execution.
                let take = if spec.limit > 0 {
                    spec.limit as usize
                } else {
                    STREAM_BATCH_SIZE as usize
                };
                let rows = out
                    .into_iter()
                    .skip(spec.skip as usize)
                    .take(take)
                    .map(|row| project(row, &spec.projection))
                    .collect();
                Ok(ExecOutcome { rows, affected: 0 })
            }
            StatementKind::Stay => {
                let anchor = rest;
                let table = table_ref!();
                let view = self.ordered_matches(&state, table, &predicates)?;
                let rows = self
                    .window(&view)
                    .iter()
                    .map(|i| &table.rows[*i])
                    .find(|row| anchor_cmp(row, anchor, &spec.order) == Ordering::Equal)
                    .map(|row| project(row, &spec.projection))
                    .into_iter()
                    .collect();
                Ok(ExecOutcome { rows, affected: 0 })
            }
            StatementKind::GetByKey => {
                let table = table_ref!();
                let found = self.find_by_key(table, rest)?;
                Ok(ExecOutcome {
                    rows: found
                        .map(|i| project(&table.rows[i], &spec.projection))
                        .into_iter()
                        .collect(),
                    affected: 0,
                })
            }
            StatementKind::Count => {
                let table = table_ref!();
                let view = self.ordered_matches(&state, table, &predicates)?;
                Ok(ExecOutcome {
                    rows: vec![vec![OwnedValue::Int(view.len() as i64)]],
                    affected: 0,
                })
            }
            StatementKind::PositionCount => {
                let anchor = rest;
                let table = table_ref!();
                let view = self.ordered_matches(&state, table, &predicates)?;
                let before = view
                    .iter()
                    .filter(|i| {
                        anchor_cmp(&table.rows[**i], anchor, &spec.order) == Ordering::Less
                    })
                    .count();
                Ok(ExecOutcome {
                    rows: vec![vec![OwnedValue::Int(before as i64)]],
                    affected: 0,
                })
            }
            StatementKind::Insert { presence } => {
                let table = state
                    .tables
                    .get_mut(&spec.table)
                    .ok_or_else(|| eyre::eyre!("no such table {:?}", spec.table))?;
                let def = Arc::clone(&table.def);
                let width = def.columns().len();
                let mut row = vec![OwnedValue::Null; width];
                let mut param_idx = 0;
                for (col, slot) in row.iter_mut().enumerate() {
                    if presence & (1 << col) != 0 {
                        ensure!(param_idx < rest.len(), "missing insert value");
                        *slot = rest[param_idx].clone();
                        param_idx += 1;
                    }
                }
                for (col, column) in def.columns().iter().enumerate() {
                    if row[col].is_null() && column.is_auto_generate() {
                        row[col] = OwnedValue::Int(table.next_auto);
                        table.next_auto += 1;
                    } else if column.is_version_counter() {
                        row[col] = OwnedValue::Int(1);
                    }
                }
                let pk = def.pk_indices();
                let key: Vec<OwnedValue> = pk.iter().map(|c| row[*c].clone()).collect();
                if self.find_by_key(table, &key)?.is_some() {
                    return Err(BackendRejection::DuplicateKey.into());
                }
                bump_auto(table, &row);
                let readback = project(&row, &spec.projection);
                table.rows.push(row);
                Ok(ExecOutcome {
                    rows: vec![readback],
                    affected: 1,
                })
            }
            StatementKind::Update { mask, versioned } => {
                let table = state
                    .tables
                    .get_mut(&spec.table)
                    .ok_or_else(|| eyre::eyre!("no such table {:?}", spec.table))?;
                let def = Arc::clone(&table.def);
                let changed: Vec<usize> = (0..def.columns().len())
                    .filter(|c| mask & (1 << c) != 0)
                    .collect();
                let pk_len = def.pk_indices().len();
                let expected_params = changed.len() + pk_len + usize::from(versioned);
                ensure!(
                    rest.len() == expected_params,
                    "update expects {} trailing parameters, got {}",
                    expected_params,
                    rest.len()
                );
                let (values, tail) = rest.split_at(changed.len());
                let (key, version) = tail.split_at(pk_len);
                let Some(row_idx) = self.find_by_key(table, key)? else {
                    return Ok(ExecOutcome::default());
                };
                if versioned {
                    if let Some(vcol) = def.version_column() {
                        let stored = &table.rows[row_idx][vcol];
                        if !cmp_eq(stored, &version[0]) {
                            return Err(BackendRejection::VersionConflict.into());
                        }
                    }
                }
                for (col, value) in changed.iter().zip(values.iter()) {
                    table.rows[row_idx][*col] = value.clone();
                }
                if let Some(vcol) = def.version_column() {
                    let next = table.rows[row_idx][vcol].as_int().unwrap_or(0) + 1;
                    table.rows[row_idx][vcol] = OwnedValue::Int(next);
                }
                let readback = project(&table.rows[row_idx], &spec.projection);
                Ok(ExecOutcome {
                    rows: vec![readback],
                    affected: 1,
                })
            }
            StatementKind::Delete { versioned } => {
                let table = state
                    .tables
                    .get_mut(&spec.table)
                    .ok_or_else(|| eyre::eyre!("no such table {:?}", spec.table))?;
                let def = Arc::clone(&table.def);
                let pk_len = def.pk_indices().len();
                let (key, version) = rest.split_at(pk_len);
                let Some(row_idx) = self.find_by_key(table, key)? else {
                    return Ok(ExecOutcome::default());
                };
                if versioned {
                    if let Some(vcol) = def.version_column() {
                        let stored = &table.rows[row_idx][vcol];
                        if !cmp_eq(stored, &version[0]) {
                            return Err(BackendRejection::VersionConflict.into());
                        }
                    }
                }
                table.rows.remove(row_idx);
                Ok(ExecOutcome {
                    rows: Vec::new(),
                    affected: 1,
                })
            }
            StatementKind::DeleteSet => {
                let table = table_ref!();
                let view = self.ordered_matches(&state, table, &predicates)?;
                let mut doomed: Vec<usize> = view;
                doomed.sort_unstable();
                let table = state
                    .tables
                    .get_mut(&spec.table)
                    .ok_or_else(|| eyre::eyre!("no such table {:?}", spec.table))?;
                for i in doomed.iter().rev() {
                    table.rows.remove(*i);
                }
                Ok(ExecOutcome {
                    rows: Vec::new(),
                    affected: doomed.len() as u64,
                })
            }
        }
    }
}
