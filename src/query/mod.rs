//! # Query Shapes and Statement Caching
//!
//! - [`order`]: the effective ordering specification with its mandatory
//!   primary-key tie-break
//! - [`shape`]: the structured statement description handed to the SQL
//!   backend, assembled from filters, order, and pagination state
//! - [`cache`]: per-slot prepared-statement cache with selective
//!   invalidation

pub mod cache;
pub mod order;
pub mod shape;
