//! # Correlated In-Filters
//!
//! A fields lookup restricts one cursor's rows to those whose paired
//! columns match some row of a partner cursor's current filtered set.
//! Several lookups against distinct partners combine with logical AND.
//!
//! ## Push invalidation
//!
//! Each cursor carries one [`CursorLink`] node shared through `Rc`. The
//! link holds the cursor's current resolved filter state and a list of
//! weak references to dependent links. Whenever a cursor's filters change
//! it refreshes its link and walks its dependents, setting their dirty
//! flags transitively. Dependents never poll partner state; the mutation
//! itself reaches every dependent, even of a shared partner. An
//! already-dirty node stops the walk, which also terminates cyclic
//! correlation graphs.
//!
//! The flagged cursor releases its cached statements on its next
//! operation; only statement disposal is deferred, never the notification.
//!
//! A lookup holds its partner weakly: it must not keep a closed cursor
//! alive, and a dropped partner surfaces as `InvalidLookup` on the next
//! statement build.

use crate::cursor::Cursor;
use crate::error::CursorError;
use crate::filter::expr::ResolvedExpr;
use crate::filter::ResolvedFilter;
use crate::query::shape::{CorrelatedSpec, CorrelatedWhere};
use crate::schema::TableDef;
use eyre::Result;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Correlation graphs deeper than this are assumed cyclic.
const MAX_CORRELATION_DEPTH: usize = 8;

/// The filter state a partner exposes to its dependents.
#[derive(Debug, Clone, Default)]
pub(crate) struct OwnWhere {
    pub predicates: Vec<(usize, ResolvedFilter)>,
    pub complex: Option<ResolvedExpr>,
}

pub(crate) struct LinkLookup {
    pub partner: Weak<CursorLink>,
    pub pairs: Vec<(usize, usize)>,
}

/// Shared invalidation node for one cursor.
pub struct CursorLink {
    table: Arc<TableDef>,
    own_where: RefCell<OwnWhere>,
    lookups: RefCell<Vec<LinkLookup>>,
    dirty: Cell<bool>,
    dependents: RefCell<Vec<Weak<CursorLink>>>,
}

impl CursorLink {
    pub(crate) fn new(table: Arc<TableDef>) -> Rc<Self> {
        Rc::new(Self {
            table,
            own_where: RefCell::new(OwnWhere::default()),
            lookups: RefCell::new(Vec::new()),
            dirty: Cell::new(false),
            dependents: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn set_own_where(&self, own_where: OwnWhere) {
        *self.own_where.borrow_mut() = own_where;
    }

    pub(crate) fn set_lookups(&self, lookups: Vec<LinkLookup>) {
        *self.lookups.borrow_mut() = lookups;
    }

    /// Reads and clears the dirty flag.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    pub(crate) fn add_dependent(&self, dependent: Weak<CursorLink>) {
        self.dependents.borrow_mut().push(dependent);
    }

    /// Pushes invalidation to every dependent, transitively. Dead weak
    /// references are pruned along the way.
    pub(crate) fn notify_dependents(&self) {
        self.dependents.borrow_mut().retain(|weak| {
            let Some(dependent) = weak.upgrade() else {
                return false;
            };
            if !dependent.dirty.replace(true) {
                dependent.notify_dependents();
            }
            true
        });
    }

    /// Expands this link's correlations into embedded partner filter
    /// state, walking the live graph so the snapshot is always current.
    pub(crate) fn expand_correlations(&self, depth: usize) -> Result<Vec<CorrelatedSpec>> {
        if depth > MAX_CORRELATION_DEPTH {
            return Err(CursorError::InvalidLookup(
                "correlation graph exceeds maximum depth (cycle?)".into(),
            )
            .into());
        }
        let mut specs = Vec::new();
        for lookup in self.lookups.borrow().iter() {
            let Some(partner) = lookup.partner.upgrade() else {
                return Err(CursorError::InvalidLookup(
                    "lookup partner cursor is closed".into(),
                )
                .into());
            };
            let own = partner.own_where.borrow();
            specs.push(CorrelatedSpec {
                partner_table: partner.table.name().to_string(),
                pairs: lookup.pairs.clone(),
                filter: CorrelatedWhere {
                    predicates: own.predicates.clone(),
                    complex: own.complex.clone(),
                    nested: partner.expand_correlations(depth + 1)?,
                },
            });
        }
        Ok(specs)
    }
}

/// One installed correlation, as stored on the owning cursor.
pub struct FieldsLookup {
    pub(crate) partner: Weak<CursorLink>,
    pub(crate) partner_table: Arc<TableDef>,
    pub(crate) pairs: Vec<(usize, usize)>,
}

impl FieldsLookup {
    /// Deep equality for `equivalent_to`: same partner table and pairs.
    pub(crate) fn matches(&self, other: &FieldsLookup) -> bool {
        self.partner_table.name() == other.partner_table.name() && self.pairs == other.pairs
    }
}

struct PendingLookup {
    link: Weak<CursorLink>,
    table: Arc<TableDef>,
    pairs: Vec<(usize, usize)>,
    partner_columns: Vec<String>,
}

/// Builder returned by [`Cursor::set_in`]. Accumulate column pairs with
/// [`add`](Self::add), chain further partners with [`and`](Self::and), and
/// install the correlations with [`done`](Self::done).
pub struct FieldsLookupBuilder<'a> {
    cursor: &'a mut Cursor,
    finished: Vec<PendingLookup>,
    current: PendingLookup,
}

impl<'a> FieldsLookupBuilder<'a> {
    pub(crate) fn new(cursor: &'a mut Cursor, partner: &Cursor) -> Self {
        let current = PendingLookup {
            link: Rc::downgrade(partner.link()),
            table: Arc::clone(partner.table()),
            pairs: Vec::new(),
            partner_columns: Vec::new(),
        };
        Self {
            cursor,
            finished: Vec::new(),
            current,
        }
    }

    /// Pairs a column of the owning cursor with a column of the current
    /// partner. Both must exist; index coverage is validated at `done`.
    pub fn add(&mut self, this_field: &str, partner_field: &str) -> Result<&mut Self> {
        let this_col = self.cursor.table().column_index(this_field).ok_or_else(|| {
            CursorError::InvalidLookup(format!(
                "unknown column {:?} on {}",
                this_field,
                self.cursor.table().name()
            ))
        })?;
        let partner_col = self.current.table.column_index(partner_field).ok_or_else(|| {
            CursorError::InvalidLookup(format!(
                "unknown column {:?} on {}",
                partner_field,
                self.current.table.name()
            ))
        })?;
        self.current.pairs.push((this_col, partner_col));
        self.current.partner_columns.push(partner_field.to_string());
        Ok(self)
    }

    /// Closes the pair list for the current partner and starts an
    /// independent correlation against another cursor.
    pub fn and(&mut self, partner: &Cursor) -> &mut Self {
        let next = PendingLookup {
            link: Rc::downgrade(partner.link()),
            table: Arc::clone(partner.table()),
            pairs: Vec::new(),
            partner_columns: Vec::new(),
        };
        self.finished.push(std::mem::replace(&mut self.current, next));
        self
    }

    /// Validates and installs the accumulated correlations, replacing any
    /// lookups previously installed on the owning cursor.
    pub fn done(mut self) -> Result<()> {
        self.finished.push(self.current);
        let this_table = Arc::clone(self.cursor.table());

        for pending in &self.finished {
            if pending.pairs.is_empty() {
                return Err(CursorError::InvalidLookup(format!(
                    "no column pairs against {}",
                    pending.table.name()
                ))
                .into());
            }
            // This side: every referenced column must be covered by an index.
            for (this_col, _) in &pending.pairs {
                let name = this_table.columns()[*this_col].name();
                if !column_indexed(&this_table, name) {
                    return Err(CursorError::InvalidLookup(format!(
                        "column {:?} on {} is not index-bearing",
                        name,
                        this_table.name()
                    ))
                    .into());
                }
            }
            // Partner side: the pair columns must exactly match some index.
            if !pending.table.has_index_on(&pending.partner_columns) {
                return Err(CursorError::InvalidLookup(format!(
                    "columns {:?} do not match any index on {}",
                    pending.partner_columns,
                    pending.table.name()
                ))
                .into());
            }
        }

        let lookups: Vec<FieldsLookup> = self
            .finished
            .iter()
            .map(|p| FieldsLookup {
                partner: p.link.clone(),
                partner_table: Arc::clone(&p.table),
                pairs: p.pairs.clone(),
            })
            .collect();

        for pending in &self.finished {
            if let Some(partner) = pending.link.upgrade() {
                partner.add_dependent(Rc::downgrade(self.cursor.link()));
            } else {
                return Err(
                    CursorError::InvalidLookup("lookup partner cursor is closed".into()).into(),
                );
            }
        }

        self.cursor.install_lookups(lookups);
        Ok(())
    }
}

fn column_indexed(table: &TableDef, column: &str) -> bool {
    table.primary_key().iter().any(|c| c == column)
        || table
            .indexes()
            .iter()
            .any(|ix| ix.columns().iter().any(|c| c == column))
}
