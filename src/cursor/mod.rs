//! # Record Cursors
//!
//! A cursor exposes one table as a filtered, ordered, pageable set of
//! records with optimistic-concurrency writes. It owns its filter state,
//! ordering, row and shadow buffers, and prepared-statement cache, and
//! holds non-owning references to the shared session and the SQL backend.
//!
//! ## Buffers
//!
//! The row buffer carries the materialized field values of the active row;
//! the shadow buffer carries the last value read from storage for the same
//! logical row. The shadow supplies old values to lifecycle hooks, drives
//! minimal changed-column detection on update, and carries the version
//! token forward. A cursor built over a restricted column subset always
//! has its primary-key (and version) columns implicitly projected.
//!
//! ## Invalidation
//!
//! Mutating filters, order, pagination, or correlations releases the
//! cached statements that depend on the query shape; replacing an exact or
//! range filter with another of the same shape keeps the statements and
//! only rebinds parameters, so live-adjusting a single-value filter never
//! pays re-planning cost. The navigation skip invalidates only the
//! forward/backward statement pair.
//!
//! ## Threading
//!
//! One cursor belongs to one logical thread of control. All calls are
//! synchronous and blocking; sharing a cursor across concurrent callers
//! requires external synchronization. The statement cache mutates during
//! reads (rebuild on miss) and is deliberately not thread-safe.

mod navigate;
mod write;

pub mod lookup;

pub use navigate::{NavState, RowIter};

use crate::backend::{Action, CursorHooks, ExecOutcome, SqlBackend};
use crate::error::CursorError;
use crate::filter::expr::{self, ResolvedExpr};
use crate::filter::{resolve_pattern, FilterSet, ResolvedFilter, ShapeEffect};
use crate::query::cache::{StatementCache, StatementSlot};
use crate::query::order::OrderSpec;
use crate::query::shape::{ShapeBuilder, StatementKind, StatementSpec};
use crate::schema::TableDef;
use crate::session::Session;
use crate::types::OwnedValue;
use eyre::Result;
use lookup::{CursorLink, FieldsLookup, FieldsLookupBuilder, LinkLookup, OwnWhere};
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

/// Materialized field values of one row, in projection order.
#[derive(Debug, Clone)]
pub struct RowBuffer {
    table: Arc<TableDef>,
    projection: Vec<usize>,
    values: Vec<OwnedValue>,
    dirty: Vec<bool>,
    version: u64,
}

impl RowBuffer {
    fn new(table: Arc<TableDef>, projection: Vec<usize>) -> Self {
        let width = projection.len();
        Self {
            table,
            projection,
            values: vec![OwnedValue::Null; width],
            dirty: vec![false; width],
            version: 0,
        }
    }

    pub fn value(&self, field: &str) -> Result<&OwnedValue> {
        let pos = self.field_position(field)?;
        Ok(&self.values[pos])
    }

    pub fn values(&self) -> &[OwnedValue] {
        &self.values
    }

    /// The optimistic-concurrency version token. Zero for a row that has
    /// never been persisted.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_value(&mut self, field: &str, value: OwnedValue) -> Result<()> {
        let pos = self.field_position(field)?;
        self.values[pos] = value;
        self.dirty[pos] = true;
        Ok(())
    }

    pub(crate) fn field_position(&self, field: &str) -> Result<usize> {
        let column = self.table.column_index(field).ok_or_else(|| {
            CursorError::Validation(format!(
                "unknown column {:?} on {}",
                field,
                self.table.name()
            ))
        })?;
        self.position_of(column).ok_or_else(|| {
            CursorError::Validation(format!(
                "column {:?} is not part of the cursor projection",
                field
            ))
            .into()
        })
    }

    pub(crate) fn position_of(&self, column: usize) -> Option<usize> {
        self.projection.iter().position(|c| *c == column)
    }

    pub(crate) fn value_at(&self, pos: usize) -> &OwnedValue {
        &self.values[pos]
    }

    pub(crate) fn dirty_at(&self, pos: usize) -> bool {
        self.dirty[pos]
    }

    /// Loads stored values, picking the version token out of the projected
    /// version column when the table has one.
    pub(crate) fn load(&mut self, values: Vec<OwnedValue>) {
        debug_assert_eq!(values.len(), self.projection.len());
        self.values = values;
        self.dirty.fill(false);
        self.version = self
            .table
            .version_column()
            .and_then(|col| self.position_of(col))
            .and_then(|pos| self.values[pos].as_int())
            .map(|v| v.max(0) as u64)
            .unwrap_or(0);
    }

    pub(crate) fn clear(&mut self) {
        self.values.fill(OwnedValue::Null);
        self.dirty.fill(false);
        self.version = 0;
    }
}

/// A filtered, ordered, write-capable view over one table.
pub struct Cursor {
    session: Rc<Session>,
    backend: Arc<dyn SqlBackend>,
    table: Arc<TableDef>,
    projection: Vec<usize>,
    filters: FilterSet,
    complex_text: Option<String>,
    complex: Option<ResolvedExpr>,
    lookups: Vec<FieldsLookup>,
    order: OrderSpec,
    offset: u64,
    row_limit: u64,
    pub(crate) nav_skip: u64,
    pub(crate) row: RowBuffer,
    pub(crate) shadow: RowBuffer,
    pub(crate) state: NavState,
    pub(crate) cache: StatementCache,
    link: Rc<CursorLink>,
    pub(crate) hooks: Option<Arc<dyn CursorHooks>>,
    pub(crate) stream: Option<VecDeque<Vec<OwnedValue>>>,
    pub(crate) insert_fast_path: Cell<Option<bool>>,
    closed: bool,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("table", &self.table.name())
            .field("state", &self.state)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    /// Opens a cursor over every column of `table_name`.
    pub fn open(session: &Rc<Session>, table_name: &str) -> Result<Cursor> {
        let table = session.backend().table_def(table_name)?;
        let all: Vec<&str> = table.columns().iter().map(|c| c.name()).collect();
        Self::open_projected(session, table_name, &all)
    }

    /// Opens a cursor over a restricted column subset. Primary-key and
    /// version columns are always implicitly included.
    pub fn open_projected(
        session: &Rc<Session>,
        table_name: &str,
        columns: &[&str],
    ) -> Result<Cursor> {
        session.register_cursor()?;
        let result = Self::build(session, table_name, columns);
        if result.is_err() {
            session.release_cursor();
        }
        result
    }

    fn build(session: &Rc<Session>, table_name: &str, columns: &[&str]) -> Result<Cursor> {
        let backend = Arc::clone(session.backend());
        let table = backend.table_def(table_name)?;
        if table.columns().len() > crate::config::MAX_TABLE_COLUMNS {
            return Err(CursorError::Validation(format!(
                "table {} has {} columns, at most {} are supported",
                table.name(),
                table.columns().len(),
                crate::config::MAX_TABLE_COLUMNS
            ))
            .into());
        }
        let mut projection = Vec::with_capacity(columns.len());
        for name in columns {
            let column = table.column_index(name).ok_or_else(|| {
                CursorError::Validation(format!(
                    "unknown column {:?} on {}",
                    name,
                    table.name()
                ))
            })?;
            if !projection.contains(&column) {
                projection.push(column);
            }
        }
        for pk in table.pk_indices() {
            if !projection.contains(&pk) {
                projection.push(pk);
            }
        }
        if let Some(vcol) = table.version_column() {
            if !projection.contains(&vcol) {
                projection.push(vcol);
            }
        }
        let order = OrderSpec::pk_only(&table)?;
        let row = RowBuffer::new(Arc::clone(&table), projection.clone());
        let shadow = row.clone();
        Ok(Cursor {
            session: Rc::clone(session),
            backend,
            link: CursorLink::new(Arc::clone(&table)),
            table,
            projection,
            filters: FilterSet::new(),
            complex_text: None,
            complex: None,
            lookups: Vec::new(),
            order,
            offset: 0,
            row_limit: 0,
            nav_skip: 0,
            row,
            shadow,
            state: NavState::Unpositioned,
            cache: StatementCache::new(),
            hooks: None,
            stream: None,
            insert_fast_path: Cell::new(None),
            closed: false,
        })
    }

    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }

    pub(crate) fn link(&self) -> &Rc<CursorLink> {
        &self.link
    }

    pub fn set_hooks(&mut self, hooks: Arc<dyn CursorHooks>) {
        self.hooks = Some(hooks);
    }

    /// Releases all cached statements and detaches from the session.
    /// Idempotent; a closed cursor rejects every other operation.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cache.release_all();
        self.stream = None;
        self.session.release_cursor();
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CursorError::ClosedResource("cursor").into());
        }
        self.session.ensure_open()
    }

    pub(crate) fn check_permission(&self, action: Action) -> Result<()> {
        if !self.session.is_allowed(self.table.name(), action) {
            return Err(CursorError::PermissionDenied {
                action: action.name(),
                object: self.table.name().to_string(),
            }
            .into());
        }
        Ok(())
    }

    // ---- filter mutators ----------------------------------------------

    pub fn set_exact(&mut self, field: &str, value: impl Into<OwnedValue>) -> Result<()> {
        let column = self.column(field)?;
        let value = value.into();
        self.check_value_type(column, &value)?;
        let effect = self.filters.set(column, ResolvedFilter::Eq(value));
        self.after_filter_change(effect);
        Ok(())
    }

    /// Sets an inclusive range filter; either bound may be `None` for an
    /// open end. Both bounds `None` clears the filter on that field.
    pub fn set_range(
        &mut self,
        field: &str,
        lo: Option<OwnedValue>,
        hi: Option<OwnedValue>,
    ) -> Result<()> {
        let column = self.column(field)?;
        if lo.is_none() && hi.is_none() {
            let effect = self.filters.clear(column);
            self.after_filter_change(effect);
            return Ok(());
        }
        if let Some(lo) = &lo {
            self.check_value_type(column, lo)?;
        }
        if let Some(hi) = &hi {
            self.check_value_type(column, hi)?;
        }
        let effect = self.filters.set(column, ResolvedFilter::Range { lo, hi });
        self.after_filter_change(effect);
        Ok(())
    }

    /// Sets a filter from range-string text resolved against the column
    /// type (see the [`filter`](crate::filter) module for the grammar).
    pub fn set_pattern(&mut self, field: &str, text: &str) -> Result<()> {
        let column = self.column(field)?;
        let resolved = resolve_pattern(text, &self.table.columns()[column])?;
        let effect = self.filters.set(column, resolved);
        self.after_filter_change(effect);
        Ok(())
    }

    pub fn clear_filter(&mut self, field: &str) -> Result<()> {
        let column = self.column(field)?;
        let effect = self.filters.clear(column);
        self.after_filter_change(effect);
        Ok(())
    }

    /// Parses and resolves a boolean filter expression over this cursor's
    /// columns. The expression is parsed once; column references that do
    /// not resolve fail with `InvalidFilterExpression`.
    pub fn set_complex_filter(&mut self, text: &str) -> Result<()> {
        let parsed = expr::parse(text)?;
        let resolved = expr::resolve(&parsed, &self.table)?;
        self.complex_text = Some(text.to_string());
        self.complex = Some(resolved);
        self.after_filter_change(ShapeEffect::Rebuild);
        Ok(())
    }

    pub fn clear_complex_filter(&mut self) {
        if self.complex.take().is_some() {
            self.complex_text = None;
            self.after_filter_change(ShapeEffect::Rebuild);
        }
    }

    /// Starts building a correlated in-filter against `partner`. The
    /// returned builder validates and installs the correlation on
    /// [`done`](FieldsLookupBuilder::done).
    pub fn set_in<'a>(&'a mut self, partner: &Cursor) -> FieldsLookupBuilder<'a> {
        FieldsLookupBuilder::new(self, partner)
    }

    pub fn clear_lookups(&mut self) {
        if !self.lookups.is_empty() {
            self.lookups.clear();
            self.after_filter_change(ShapeEffect::Rebuild);
        }
    }

    pub(crate) fn install_lookups(&mut self, lookups: Vec<FieldsLookup>) {
        self.lookups = lookups;
        self.after_filter_change(ShapeEffect::Rebuild);
    }

    fn after_filter_change(&mut self, effect: ShapeEffect) {
        match effect {
            ShapeEffect::Rebuild => {
                tracing::trace!(table = %self.table.name(), "filter shape changed, releasing statements");
                self.cache.release_shape_dependent();
                self.stream = None;
            }
            // Same shape: cached statements stay, parameters rebind on the
            // next execute.
            ShapeEffect::Rebind => {}
            ShapeEffect::None => return,
        }
        // Dependent cursors correlate against this cursor's filtered set,
        // so even a rebind-only value change must reach them.
        self.refresh_link();
    }

    pub(crate) fn refresh_link(&self) {
        self.link.set_own_where(OwnWhere {
            predicates: self.filters.snapshot(),
            complex: self.complex.clone(),
        });
        self.link.set_lookups(
            self.lookups
                .iter()
                .map(|l| LinkLookup {
                    partner: l.partner.clone(),
                    pairs: l.pairs.clone(),
                })
                .collect(),
        );
        self.link.notify_dependents();
    }

    // ---- order and pagination -----------------------------------------

    /// Replaces the ordering. Primary-key columns are appended ascending;
    /// duplicate columns are rejected. Resets the cursor position.
    pub fn set_order(&mut self, keys: &[(&str, bool)]) -> Result<()> {
        let order = OrderSpec::new(&self.table, keys)?;
        let mut projection_grew = false;
        for key in order.keys() {
            if !self.projection.contains(&key.column) {
                self.projection.push(key.column);
                projection_grew = true;
            }
        }
        self.order = order;
        if projection_grew {
            self.row = RowBuffer::new(Arc::clone(&self.table), self.projection.clone());
            self.shadow = self.row.clone();
            self.cache.release_all();
        } else {
            self.cache.release_shape_dependent();
        }
        self.stream = None;
        self.state = NavState::Unpositioned;
        Ok(())
    }

    pub fn order_by_column_names(&self) -> Vec<String> {
        self.order.column_names()
    }

    pub fn set_offset(&mut self, offset: u64) {
        if self.offset != offset {
            self.offset = offset;
            self.cache.release_shape_dependent();
            self.stream = None;
        }
    }

    pub fn set_row_limit(&mut self, limit: u64) {
        if self.row_limit != limit {
            self.row_limit = limit;
            self.cache.release_shape_dependent();
            self.stream = None;
        }
    }

    // ---- copies and equivalence ---------------------------------------

    /// Copies the other cursor's filter state (field filters, complex
    /// filter, correlations). Both cursors must view the same table.
    pub fn copy_filters_from(&mut self, other: &Cursor) -> Result<()> {
        self.ensure_same_table(other)?;
        self.filters = other.filters.clone();
        self.complex_text = other.complex_text.clone();
        self.complex = match &other.complex_text {
            // Re-resolve against this cursor's schema view.
            Some(text) => Some(expr::resolve(&expr::parse(text)?, &self.table)?),
            None => None,
        };
        self.lookups = other
            .lookups
            .iter()
            .map(|l| FieldsLookup {
                partner: l.partner.clone(),
                partner_table: Arc::clone(&l.partner_table),
                pairs: l.pairs.clone(),
            })
            .collect();
        for lookup in &self.lookups {
            if let Some(partner) = lookup.partner.upgrade() {
                partner.add_dependent(Rc::downgrade(&self.link));
            }
        }
        self.after_filter_change(ShapeEffect::Rebuild);
        Ok(())
    }

    pub fn copy_order_from(&mut self, other: &Cursor) -> Result<()> {
        self.ensure_same_table(other)?;
        let keys: Vec<(&str, bool)> = other
            .order
            .keys()
            .iter()
            .map(|k| (k.name.as_str(), k.descending))
            .collect();
        self.set_order(&keys)
    }

    /// Deep filter/order equality with another cursor of the same table.
    pub fn equivalent_to(&self, other: &Cursor) -> bool {
        self.table.name() == other.table.name()
            && self.filters == other.filters
            && self.complex == other.complex
            && self.order == other.order
            && self.lookups.len() == other.lookups.len()
            && self
                .lookups
                .iter()
                .zip(other.lookups.iter())
                .all(|(a, b)| a.matches(b))
    }

    fn ensure_same_table(&self, other: &Cursor) -> Result<()> {
        if self.table.name() != other.table.name() {
            return Err(CursorError::Validation(format!(
                "cursor tables differ: {} vs {}",
                self.table.name(),
                other.table.name()
            ))
            .into());
        }
        Ok(())
    }

    // ---- row access ----------------------------------------------------

    pub fn row(&self) -> &RowBuffer {
        &self.row
    }

    pub fn shadow(&self) -> &RowBuffer {
        &self.shadow
    }

    pub fn value(&self, field: &str) -> Result<&OwnedValue> {
        self.row.value(field)
    }

    pub fn set_value(&mut self, field: &str, value: impl Into<OwnedValue>) -> Result<()> {
        self.row.set_value(field, value.into())
    }

    /// Clears the row buffer for a fresh insert. The version token starts
    /// at zero until the row is persisted.
    pub fn init_row(&mut self) {
        self.row.clear();
        self.shadow.clear();
        self.state = NavState::Unpositioned;
    }

    /// Delimiter-escaped flat-text rendering of the current row. Fields
    /// containing the delimiter, a quote, or a line break are wrapped in
    /// double quotes with embedded quotes doubled.
    pub fn export_text(&self, delimiter: char) -> String {
        render_row(self.row.values(), delimiter)
    }

    // ---- aggregates and keyed access ----------------------------------

    /// Row count of the filtered set, ignoring the pagination window.
    pub fn count(&mut self) -> Result<u64> {
        self.check_permission(Action::Read)?;
        let out = self.run_shape_slot(StatementSlot::Count, StatementKind::Count, &[])?;
        read_count(&out)
    }

    /// One-based ordinal position of the current row within the filtered,
    /// ordered set.
    pub fn position(&mut self) -> Result<u64> {
        self.check_permission(Action::Read)?;
        if self.state != NavState::Positioned {
            return Err(CursorError::Validation("cursor is not positioned".into()).into());
        }
        let anchor = self.anchor_params()?;
        let out = self.run_shape_slot(
            StatementSlot::Position,
            StatementKind::PositionCount,
            &anchor,
        )?;
        Ok(read_count(&out)? + 1)
    }

    /// Positions on the row with the given primary-key values, bypassing
    /// filters. Returns `false` when no such row exists.
    pub fn try_get_by_key(&mut self, key: &[OwnedValue]) -> Result<bool> {
        self.check_permission(Action::Read)?;
        let pk_len = self.table.pk_indices().len();
        if key.len() != pk_len {
            return Err(CursorError::Validation(format!(
                "key arity {} does not match primary key of {} ({})",
                key.len(),
                self.table.name(),
                pk_len
            ))
            .into());
        }
        let out = self.run_key_slot(StatementSlot::GetByKey, StatementKind::GetByKey, key)?;
        match out.rows.into_iter().next() {
            Some(values) => {
                self.adopt_row(values);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// [`try_get_by_key`](Self::try_get_by_key) that raises
    /// `RecordNotFound` instead of returning `false`.
    pub fn get_by_key(&mut self, key: &[OwnedValue]) -> Result<()> {
        if self.try_get_by_key(key)? {
            Ok(())
        } else {
            Err(CursorError::RecordNotFound {
                object: self.table.name().to_string(),
            }
            .into())
        }
    }

    // ---- statement plumbing -------------------------------------------

    pub(crate) fn column(&self, field: &str) -> Result<usize> {
        self.table.column_index(field).ok_or_else(|| {
            CursorError::Validation(format!(
                "unknown column {:?} on {}",
                field,
                self.table.name()
            ))
            .into()
        })
    }

    fn check_value_type(&self, column: usize, value: &OwnedValue) -> Result<()> {
        let def = &self.table.columns()[column];
        let ty = def.data_type();
        let ok = match value {
            OwnedValue::Null => true,
            OwnedValue::Bool(_) => matches!(ty, crate::types::DataType::Bool),
            OwnedValue::Int(_) | OwnedValue::Float(_) => ty.is_numeric() || ty.is_temporal(),
            OwnedValue::Timestamp(_) => ty.is_temporal() || ty.is_integer(),
            OwnedValue::Text(_) => ty.is_text(),
            OwnedValue::Blob(_) => ty.is_blob(),
        };
        if !ok {
            return Err(CursorError::Validation(format!(
                "value {:?} does not fit column {:?} of type {:?}",
                value,
                def.name(),
                ty
            ))
            .into());
        }
        Ok(())
    }

    /// Applies any pending push invalidation from correlation partners.
    pub(crate) fn flush_invalidation(&mut self) {
        if self.link.take_dirty() {
            tracing::trace!(table = %self.table.name(), "partner filter change, releasing statements");
            self.cache.release_shape_dependent();
            self.stream = None;
        }
    }

    pub(crate) fn shape_spec(&self, kind: StatementKind) -> Result<StatementSpec> {
        let correlated = self.link.expand_correlations(0)?;
        Ok(ShapeBuilder {
            table: self.table.name(),
            projection: &self.projection,
            filters: &self.filters,
            complex: self.complex.as_ref(),
            correlated,
            order: &self.order,
            offset: self.offset,
            limit: self.row_limit,
            skip: self.nav_skip,
        }
        .spec(kind))
    }

    /// Key-addressed statements carry no filter shape at all, so they
    /// survive shape invalidation.
    pub(crate) fn key_spec(&self, kind: StatementKind) -> StatementSpec {
        StatementSpec {
            kind,
            table: self.table.name().to_string(),
            projection: self.projection.clone(),
            predicates: Vec::new(),
            complex: None,
            correlated: Vec::new(),
            order: Vec::new(),
            offset: 0,
            limit: 0,
            skip: 0,
        }
    }

    pub(crate) fn filter_params(&self) -> Vec<OwnedValue> {
        let mut params = Vec::new();
        for (_, filter) in self.filters.ordered() {
            filter.params(&mut params);
        }
        params
    }

    /// Ordering-key values of the current row, the anchor for directional
    /// statements.
    pub(crate) fn anchor_params(&self) -> Result<Vec<OwnedValue>> {
        self.order
            .keys()
            .iter()
            .map(|key| {
                self.row
                    .position_of(key.column)
                    .map(|pos| self.row.value_at(pos).clone())
                    .ok_or_else(|| {
                        CursorError::Validation(format!(
                            "order column {:?} missing from projection",
                            key.name
                        ))
                        .into()
                    })
            })
            .collect()
    }

    /// Ordering-key values extracted from a raw storage row in projection
    /// order.
    pub(crate) fn order_values_from(&self, values: &[OwnedValue]) -> Result<Vec<OwnedValue>> {
        self.order
            .keys()
            .iter()
            .map(|key| {
                self.row
                    .position_of(key.column)
                    .map(|pos| values[pos].clone())
                    .ok_or_else(|| {
                        CursorError::Validation(format!(
                            "order column {:?} missing from projection",
                            key.name
                        ))
                        .into()
                    })
            })
            .collect()
    }

    pub(crate) fn order_descending_flags(&self) -> Vec<bool> {
        self.order.keys().iter().map(|k| k.descending).collect()
    }

    pub(crate) fn key_params(&self, buffer: &RowBuffer) -> Result<Vec<OwnedValue>> {
        self.table
            .pk_indices()
            .iter()
            .map(|col| {
                buffer
                    .position_of(*col)
                    .map(|pos| buffer.value_at(pos).clone())
                    .ok_or_else(|| {
                        CursorError::Validation(
                            "primary key column missing from projection".into(),
                        )
                        .into()
                    })
            })
            .collect()
    }

    /// Human-readable record key for error context.
    pub(crate) fn describe_key(&self, buffer: &RowBuffer) -> String {
        let parts: Vec<String> = self
            .table
            .pk_indices()
            .iter()
            .map(|col| {
                let name = self.table.columns()[*col].name();
                match buffer.position_of(*col) {
                    Some(pos) => format!("{}={:?}", name, buffer.value_at(pos)),
                    None => format!("{}=?", name),
                }
            })
            .collect();
        format!("{}({})", self.table.name(), parts.join(", "))
    }

    /// Executes a shape-dependent slot: filter parameters first, then any
    /// statement-specific trailing parameters.
    pub(crate) fn run_shape_slot(
        &mut self,
        slot: StatementSlot,
        kind: StatementKind,
        extra: &[OwnedValue],
    ) -> Result<ExecOutcome> {
        self.ensure_open()?;
        self.flush_invalidation();
        let spec = self.shape_spec(kind)?;
        let mut params = self.filter_params();
        params.extend_from_slice(extra);
        let backend = Arc::clone(&self.backend);
        let table = Arc::clone(&self.table);
        let stmt = self
            .cache
            .get_or_build(slot, || backend.prepare(&table, &spec))?;
        stmt.execute(&params)
    }

    /// Executes a key-addressed slot with exactly the given parameters.
    pub(crate) fn run_key_slot(
        &mut self,
        slot: StatementSlot,
        kind: StatementKind,
        params: &[OwnedValue],
    ) -> Result<ExecOutcome> {
        self.ensure_open()?;
        self.flush_invalidation();
        let spec = self.key_spec(kind);
        let backend = Arc::clone(&self.backend);
        let table = Arc::clone(&self.table);
        let stmt = self
            .cache
            .get_or_build(slot, || backend.prepare(&table, &spec))?;
        stmt.execute(params)
    }

    /// One-off read of the row at a one-based ordinal within the filtered,
    /// ordered set. Uncached, since the offset is baked into the statement
    /// shape.
    pub(crate) fn row_at_ordinal(&mut self, ordinal: u64) -> Result<Option<Vec<OwnedValue>>> {
        if ordinal == 0 {
            return Ok(None);
        }
        self.ensure_open()?;
        self.flush_invalidation();
        // Ordinals count within the full filtered set, matching the
        // position statements, so the pagination window does not apply.
        let mut spec = self.shape_spec(StatementKind::First)?;
        spec.offset = ordinal - 1;
        spec.limit = 1;
        let params = self.filter_params();
        let mut stmt = self.backend.prepare(&self.table, &spec)?;
        let out = stmt.execute(&params)?;
        Ok(out.rows.into_iter().next())
    }

    /// One-based ordinal of an arbitrary ordering-key tuple within the
    /// filtered, ordered set.
    pub(crate) fn position_of_key(&mut self, key: &[OwnedValue]) -> Result<u64> {
        let out =
            self.run_shape_slot(StatementSlot::Position, StatementKind::PositionCount, key)?;
        Ok(read_count(&out)? + 1)
    }

    /// Adopts a freshly read storage row into both buffers.
    pub(crate) fn adopt_row(&mut self, values: Vec<OwnedValue>) {
        self.row.load(values);
        self.shadow = self.row.clone();
        self.state = NavState::Positioned;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}

fn render_row(values: &[OwnedValue], delimiter: char) -> String {
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        let text = render_value(value);
        if text.contains(delimiter)
            || text.contains('"')
            || text.contains('\n')
            || text.contains('\r')
        {
            out.push('"');
            out.push_str(&text.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&text);
        }
    }
    out
}

fn render_value(value: &OwnedValue) -> String {
    match value {
        OwnedValue::Null => String::new(),
        OwnedValue::Bool(b) => b.to_string(),
        OwnedValue::Int(i) => i.to_string(),
        OwnedValue::Float(f) => f.to_string(),
        OwnedValue::Text(s) => s.clone(),
        OwnedValue::Blob(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
        OwnedValue::Timestamp(t) => t.to_string(),
    }
}

pub(crate) fn read_count(out: &ExecOutcome) -> Result<u64> {
    out.rows
        .first()
        .and_then(|row| row.first())
        .and_then(|v| v.as_int())
        .map(|n| n.max(0) as u64)
        .ok_or_else(|| CursorError::Backend("count statement returned no row".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_quotes_on_demand() {
        let values = vec![
            OwnedValue::Text("a;b \"x\"".into()),
            OwnedValue::Int(7),
            OwnedValue::Null,
            OwnedValue::Text("plain".into()),
        ];
        assert_eq!(render_row(&values, ';'), "\"a;b \"\"x\"\"\";7;;plain");
        assert_eq!(render_row(&values, '|'), "\"a;b \"\"x\"\"\"|7||plain");
    }

    #[test]
    fn row_buffer_extracts_version() {
        let table = Arc::new(
            TableDef::new(
                "t",
                vec![
                    crate::schema::ColumnDef::new("id", crate::types::DataType::Int8),
                    crate::schema::ColumnDef::new("recversion", crate::types::DataType::Int8)
                        .version_counter(),
                ],
            )
            .with_primary_key(vec!["id"]),
        );
        let mut buffer = RowBuffer::new(table, vec![0, 1]);
        buffer.load(vec![OwnedValue::Int(9), OwnedValue::Int(4)]);
        assert_eq!(buffer.version(), 4);
        buffer.clear();
        assert_eq!(buffer.version(), 0);
    }
}
