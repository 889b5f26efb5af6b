//! # rowset - Embedded Record-Cursor Engine
//!
//! rowset presents one table of a relational backend as a filtered,
//! ordered, pageable set of records with optimistic-concurrency writes.
//! The engine is dialect agnostic: it never renders SQL text, it hands a
//! structured statement description to a pluggable backend and caches the
//! prepared result per statement shape.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rowset::{Cursor, MemoryBackend, Session};
//!
//! let backend = MemoryBackend::new();
//! backend.create_table(orders_table());
//!
//! let session = Session::new(std::sync::Arc::new(backend));
//! let mut cursor = Cursor::open(&session, "orders")?;
//!
//! cursor.set_exact("status", "open")?;
//! cursor.set_order(&[("created", false)])?;
//! while cursor.next_in_set()? {
//!     println!("{}", cursor.export_text(';'));
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Cursor (navigation + writes)       │
//! ├──────────────┬──────────────┬────────────┤
//! │  FilterSet   │  OrderSpec   │ Correlated │
//! │  + complex   │  + window    │  lookups   │
//! ├──────────────┴──────────────┴────────────┤
//! │   ShapeBuilder → StatementSpec (shape)    │
//! ├──────────────────────────────────────────┤
//! │   StatementCache (per-slot, per-mask)     │
//! ├──────────────────────────────────────────┤
//! │   SqlBackend / PreparedStatement traits   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Caller mutations flow top-down: changing a filter, the order, or the
//! pagination window invalidates exactly the cached statements whose shape
//! depends on it. Navigation asks the cache for a statement of the required
//! kind, the shape builder supplies the spec on a miss, and the executed
//! row lands in the cursor's buffers. Correlated partners push invalidation
//! through shared [`cursor::lookup::CursorLink`] nodes.
//!
//! The [`backend::memory::MemoryBackend`] reference backend implements the
//! full statement surface in memory and backs the integration tests;
//! production deployments plug in their own [`backend::SqlBackend`].

pub mod backend;
pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod interpolate;
pub mod query;
pub mod schema;
pub mod session;
pub mod types;

pub use backend::memory::MemoryBackend;
pub use backend::{AccessPolicy, Action, CursorHooks, ExecOutcome, PreparedStatement, SqlBackend};
pub use cursor::{Cursor, NavState, RowBuffer};
pub use error::{BackendRejection, CursorError};
pub use interpolate::{PositionInterpolator, PositionProbe};
pub use query::order::OrderSpec;
pub use schema::{ColumnDef, IndexDef, TableDef};
pub use session::Session;
pub use types::{DataType, OwnedValue};
