//! # Configuration Constants
//!
//! Centralized configuration values for the cursor engine. Constants are
//! grouped by functional area; interdependent values are documented and
//! enforced through compile-time assertions so they cannot drift apart.

/// Upper bound on simultaneously open cursors per session.
///
/// Exceeding this is treated as a resource leak in the calling code and is
/// a fatal configuration error, never a retry condition.
pub const MAX_OPEN_CURSORS: usize = 256;

/// Maximum number of points held by a position interpolator.
///
/// Once full, inserting a new point evicts the interior point whose removal
/// loses the least accuracy.
pub const MAX_INTERPOLATION_POINTS: usize = 32;

/// Number of probe queries the generic refinement policy may issue per call.
pub const INTERPOLATION_REFINEMENT_BUDGET: usize = 12;

/// Seed points for the stratified refinement policy: the first row plus up
/// to nine evenly spaced skip-jump anchors.
pub const STRATIFIED_SEED_POINTS: usize = 10;

/// Rows fetched per batch by the streaming `next_in_set` path.
pub const STREAM_BATCH_SIZE: u64 = 64;

/// Upper bound on columns per table.
///
/// Insert and update statements encode column presence in a `u64` bitmask;
/// opening a cursor over a wider table is a validation error.
pub const MAX_TABLE_COLUMNS: usize = 64;

// Stratified seeding must fit in the point budget without eviction.
const _: () = assert!(STRATIFIED_SEED_POINTS <= MAX_INTERPOLATION_POINTS);
const _: () = assert!(INTERPOLATION_REFINEMENT_BUDGET > 0);
const _: () = assert!(STREAM_BATCH_SIZE > 0);
// The presence/changed masks are u64s.
const _: () = assert!(MAX_TABLE_COLUMNS <= u64::BITS as usize);
