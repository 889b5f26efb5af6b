//! # Position Interpolation
//!
//! Answers "approximately which ordinal does key K occupy in the filtered,
//! ordered set" without a full scan. The interpolator maintains a small
//! sorted set of exact `(ordering key, ordinal)` anchor points and refines
//! it adaptively; lookups between anchors are linearly interpolated by the
//! caller. The interpolator only supplies points, never an interpolated
//! value, so it never claims more accuracy than it has.
//!
//! ## Refinement policies
//!
//! - [`refine_generic`](PositionInterpolator::refine_generic): repeatedly
//!   picks the least-accurate interval (largest ordinal gap), probes a
//!   pseudo-random offset inside it, anchors the probed key with an exact
//!   position count, and stops after a fixed budget. Probe offsets
//!   alternate between the forward and backward half of the interval to
//!   avoid sampling bias.
//! - [`refine_stratified`](PositionInterpolator::refine_stratified): seeds
//!   the first row plus up to nine evenly spaced anchors by fixed-offset
//!   jumps. Preferred when the backend skips rows cheaply, because it
//!   avoids the random probes entirely.
//!
//! Probes run through the [`PositionProbe`] trait, implemented by
//! [`Cursor`] over its position-count and offset-read statements.

use crate::config::{
    INTERPOLATION_REFINEMENT_BUDGET, MAX_INTERPOLATION_POINTS, STRATIFIED_SEED_POINTS,
};
use crate::cursor::Cursor;
use crate::types::OwnedValue;
use eyre::Result;
use std::cmp::Ordering;

/// One exact anchor: this ordering-key tuple sits at this one-based ordinal.
#[derive(Debug, Clone)]
pub struct InterpolationPoint {
    key: Vec<OwnedValue>,
    ordinal: u64,
}

impl InterpolationPoint {
    pub fn key(&self) -> &[OwnedValue] {
        &self.key
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

/// Row source for refinement probes.
pub trait PositionProbe {
    /// Total rows in the filtered set.
    fn row_count(&mut self) -> Result<u64>;

    /// Ordering-key tuple of the row at a one-based ordinal, or `None`
    /// past the end.
    fn key_at(&mut self, ordinal: u64) -> Result<Option<Vec<OwnedValue>>>;

    /// Exact one-based ordinal of an ordering-key tuple.
    fn exact_position(&mut self, key: &[OwnedValue]) -> Result<u64>;
}

impl PositionProbe for Cursor {
    fn row_count(&mut self) -> Result<u64> {
        self.count()
    }

    fn key_at(&mut self, ordinal: u64) -> Result<Option<Vec<OwnedValue>>> {
        match self.row_at_ordinal(ordinal)? {
            Some(values) => Ok(Some(self.order_values_from(&values)?)),
            None => Ok(None),
        }
    }

    fn exact_position(&mut self, key: &[OwnedValue]) -> Result<u64> {
        self.position_of_key(key)
    }
}

/// Sparse sorted map from ordering key to exact ordinal.
///
/// Points are kept sorted by key under the set's own ordering (per-column
/// descending flags included) and their ordinals are clamped monotone on
/// insert: a point can never report a smaller ordinal than a
/// smaller-keyed neighbor.
#[derive(Debug)]
pub struct PositionInterpolator {
    points: Vec<InterpolationPoint>,
    descending: Vec<bool>,
    seed: u64,
}

impl PositionInterpolator {
    /// `descending` carries one flag per ordering-key column, matching the
    /// cursor's effective order.
    pub fn new(descending: Vec<bool>) -> Self {
        Self {
            points: Vec::new(),
            descending,
            seed: 0x9E3779B97F4A7C15,
        }
    }

    /// Interpolator matching a cursor's current effective order.
    pub fn for_cursor(cursor: &Cursor) -> Self {
        Self::new(cursor.order_descending_flags())
    }

    pub fn points(&self) -> &[InterpolationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drops every point, e.g. after a filter or order change.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// The anchors bracketing `key`: the greatest point at or below it and
    /// the least point above it. Either side may be absent at the edges.
    pub fn bracket(
        &self,
        key: &[OwnedValue],
    ) -> (Option<&InterpolationPoint>, Option<&InterpolationPoint>) {
        let upper = self
            .points
            .partition_point(|p| self.cmp_keys(&p.key, key) != Ordering::Greater);
        let below = upper.checked_sub(1).map(|i| &self.points[i]);
        let above = self.points.get(upper);
        (below, above)
    }

    /// Records an exact `(key, ordinal)` observation. A duplicate key
    /// replaces its point; a new point's ordinal is clamped between its
    /// neighbors so the point set stays monotone. When the set is full the
    /// interior point whose removal loses the least accuracy is evicted
    /// first.
    pub fn insert(&mut self, key: Vec<OwnedValue>, ordinal: u64) {
        let at = self
            .points
            .partition_point(|p| self.cmp_keys(&p.key, &key) == Ordering::Less);
        if let Some(existing) = self.points.get(at) {
            if self.cmp_keys(&existing.key, &key) == Ordering::Equal {
                self.points[at].ordinal = Self::clamp(&self.points, at, ordinal, true);
                return;
            }
        }
        let ordinal = Self::clamp(&self.points, at, ordinal, false);
        if self.points.len() >= MAX_INTERPOLATION_POINTS {
            let evict = self.least_informative_interior();
            self.points.remove(evict);
            let at = self
                .points
                .partition_point(|p| self.cmp_keys(&p.key, &key) == Ordering::Less);
            self.points.insert(at, InterpolationPoint { key, ordinal });
        } else {
            self.points.insert(at, InterpolationPoint { key, ordinal });
        }
    }

    fn clamp(points: &[InterpolationPoint], at: usize, ordinal: u64, replacing: bool) -> u64 {
        let mut ordinal = ordinal;
        if let Some(prev) = at.checked_sub(1).and_then(|i| points.get(i)) {
            ordinal = ordinal.max(prev.ordinal);
        }
        let next_idx = if replacing { at + 1 } else { at };
        if let Some(next) = points.get(next_idx) {
            ordinal = ordinal.min(next.ordinal);
        }
        ordinal
    }

    /// Index of the interior point with the smallest ordinal span between
    /// its neighbors; removing it changes the interpolation the least.
    fn least_informative_interior(&self) -> usize {
        let mut best = 1;
        let mut best_span = u64::MAX;
        for i in 1..self.points.len().saturating_sub(1) {
            let span = self.points[i + 1].ordinal - self.points[i - 1].ordinal;
            if span < best_span {
                best_span = span;
                best = i;
            }
        }
        best.min(self.points.len().saturating_sub(1))
    }

    /// The adjacent point pair spanning the largest ordinal gap, as
    /// indices into [`points`](Self::points).
    fn least_accurate_interval(&self) -> Option<(usize, usize)> {
        if self.points.len() < 2 {
            return None;
        }
        let mut best = None;
        let mut best_gap = 1;
        for i in 0..self.points.len() - 1 {
            let gap = self.points[i + 1].ordinal - self.points[i].ordinal;
            if gap > best_gap {
                best_gap = gap;
                best = Some((i, i + 1));
            }
        }
        best
    }

    /// Adaptive refinement: probe pseudo-random offsets inside the least
    /// accurate interval, up to the fixed budget. Stops early when no
    /// interval has room for another point.
    pub fn refine_generic(&mut self, probe: &mut dyn PositionProbe) -> Result<()> {
        self.seed_edges(probe)?;
        for round in 0..INTERPOLATION_REFINEMENT_BUDGET {
            let Some((lo, hi)) = self.least_accurate_interval() else {
                break;
            };
            let lo_ord = self.points[lo].ordinal;
            let hi_ord = self.points[hi].ordinal;
            let gap = hi_ord - lo_ord;
            let mid = lo_ord + gap / 2;
            let jitter = self.next_random() % (gap / 2).max(1);
            // Alternate sampling direction around the interval midpoint.
            let target = if round % 2 == 0 {
                (mid + jitter).min(hi_ord.saturating_sub(1)).max(lo_ord + 1)
            } else {
                mid.saturating_sub(jitter).max(lo_ord + 1)
            };
            let Some(key) = probe.key_at(target)? else {
                break;
            };
            let ordinal = probe.exact_position(&key)?;
            self.insert(key, ordinal);
        }
        Ok(())
    }

    /// Stratified seeding: the first row plus evenly spaced skip-jump
    /// anchors, each tied to an exact position count.
    pub fn refine_stratified(&mut self, probe: &mut dyn PositionProbe) -> Result<()> {
        let total = probe.row_count()?;
        if total == 0 {
            return Ok(());
        }
        let seeds = (STRATIFIED_SEED_POINTS as u64).min(total);
        let step = (total / seeds).max(1);
        let mut ordinal = 1;
        for _ in 0..seeds {
            if ordinal > total {
                break;
            }
            let Some(key) = probe.key_at(ordinal)? else {
                break;
            };
            let exact = probe.exact_position(&key)?;
            self.insert(key, exact);
            ordinal += step;
        }
        Ok(())
    }

    fn seed_edges(&mut self, probe: &mut dyn PositionProbe) -> Result<()> {
        if self.points.len() >= 2 {
            return Ok(());
        }
        let total = probe.row_count()?;
        if total == 0 {
            return Ok(());
        }
        if let Some(first) = probe.key_at(1)? {
            self.insert(first, 1);
        }
        if total > 1 {
            if let Some(last) = probe.key_at(total)? {
                self.insert(last, total);
            }
        }
        Ok(())
    }

    fn next_random(&mut self) -> u64 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn cmp_keys(&self, a: &[OwnedValue], b: &[OwnedValue]) -> Ordering {
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            let mut ord = x.sort_cmp(y);
            if self.descending.get(i).copied().unwrap_or(false) {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }
}
