// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time-range algebra.
//!
//! [`RangeSet`] is an ordered collection of disjoint half-open intervals over a
//! single shard, and [`ShardTimeRanges`] maps shard indices to range sets. The
//! bootstrap chain's reconciliation is computed entirely with these two types,
//! so their union and subtraction must be exact: a range dropped here is a
//! range the node silently fails to bootstrap.

use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ShardIndex, UnixMillis};

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the range.
    pub start: UnixMillis,
    /// Exclusive end of the range.
    pub end: UnixMillis,
}

impl TimeRange {
    /// Creates a new range. `start` must not be after `end`.
    pub fn new(start: UnixMillis, end: UnixMillis) -> Self {
        debug_assert!(start <= end, "range start {start} is after end {end}");
        Self { start, end }
    }

    /// True iff the range covers no instants.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True iff `instant` falls within the range.
    pub fn contains(&self, instant: UnixMillis) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True iff the two ranges share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True iff the two ranges overlap or are adjacent, i.e. their union is a
    /// single contiguous range.
    pub fn joinable_with(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns the overlapping sub-range, if any.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| TimeRange::new(start, end))
    }

    /// Iterates over the starts of all `block_size`-aligned blocks that
    /// intersect this range.
    pub fn block_starts(&self, block_size: Duration) -> BlockStarts {
        BlockStarts {
            next: self.start.truncate_to(block_size),
            end: self.end,
            block_size,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.0, self.end.0)
    }
}

/// Iterator over aligned block starts covering a [`TimeRange`].
#[derive(Debug, Clone)]
pub struct BlockStarts {
    next: UnixMillis,
    end: UnixMillis,
    block_size: Duration,
}

impl Iterator for BlockStarts {
    type Item = UnixMillis;

    fn next(&mut self) -> Option<UnixMillis> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = current + self.block_size;
        Some(current)
    }
}

/// An ordered set of disjoint, non-adjacent half-open time ranges.
///
/// Invariant: ranges are sorted by start and pairwise non-joinable; any insert
/// that would violate this coalesces the affected ranges into one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSet {
    ranges: Vec<TimeRange>,
}

impl RangeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `range`, coalescing it with any overlapping or adjacent
    /// members. Inserting an empty range or a range already fully covered is a
    /// no-op.
    pub fn add_range(&mut self, range: TimeRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;
        for existing in self.ranges.drain(..) {
            if existing.joinable_with(&merged) {
                merged = TimeRange::new(
                    merged.start.min(existing.start),
                    merged.end.max(existing.end),
                );
            } else if existing.end < merged.start {
                out.push(existing);
            } else {
                if !inserted {
                    out.push(merged);
                    inserted = true;
                }
                out.push(existing);
            }
        }
        if !inserted {
            out.push(merged);
        }
        self.ranges = out;
    }

    /// Unions every range of `other` into `self`.
    pub fn add_ranges(&mut self, other: &RangeSet) {
        for range in other.iter() {
            self.add_range(*range);
        }
    }

    /// Returns `self minus other`. A member partially covered by `other` is
    /// split into its surviving sub-intervals; removing a disjoint range is a
    /// no-op.
    pub fn remove_ranges(&self, other: &RangeSet) -> RangeSet {
        let mut result = self.clone();
        for range in other.iter() {
            result = result.remove_range(range);
        }
        result
    }

    /// Returns `self minus range`.
    pub fn remove_range(&self, range: &TimeRange) -> RangeSet {
        if range.is_empty() {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        for existing in &self.ranges {
            if !existing.overlaps(range) {
                out.push(*existing);
                continue;
            }
            if existing.start < range.start {
                out.push(TimeRange::new(existing.start, range.start));
            }
            if range.end < existing.end {
                out.push(TimeRange::new(range.end, existing.end));
            }
        }
        RangeSet { ranges: out }
    }

    /// True iff the set contains no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The number of disjoint ranges in the set.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Iterates the ranges in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }
}

impl From<TimeRange> for RangeSet {
    fn from(range: TimeRange) -> Self {
        let mut set = RangeSet::new();
        set.add_range(range);
        set
    }
}

impl FromIterator<TimeRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = TimeRange>>(iter: I) -> Self {
        let mut set = RangeSet::new();
        for range in iter {
            set.add_range(range);
        }
        set
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
        }
        write!(f, "}}")
    }
}

/// A per-shard map of time-range sets: the unit of "what needs bootstrapping".
///
/// A shard key with an empty range set is always dropped, so an absent key and
/// an empty set are indistinguishable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTimeRanges {
    shards: BTreeMap<ShardIndex, RangeSet>,
}

impl ShardTimeRanges {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map covering `range` for every shard in `shards`.
    pub fn from_shards_and_range(
        shards: impl IntoIterator<Item = ShardIndex>,
        range: TimeRange,
    ) -> Self {
        let mut map = Self::new();
        for shard in shards {
            map.add_shard_range(shard, range);
        }
        map
    }

    /// Unions `range` into the set for `shard`.
    pub fn add_shard_range(&mut self, shard: ShardIndex, range: TimeRange) {
        if range.is_empty() {
            return;
        }
        self.shards.entry(shard).or_default().add_range(range);
    }

    /// Returns the range set for `shard`, if the shard has any ranges.
    pub fn get(&self, shard: ShardIndex) -> Option<&RangeSet> {
        self.shards.get(&shard)
    }

    /// Per-shard union: shards present only in `other` are inserted.
    pub fn add_ranges(&mut self, other: &ShardTimeRanges) {
        for (shard, ranges) in other.iter() {
            self.shards.entry(shard).or_default().add_ranges(ranges);
        }
    }

    /// Per-shard subtraction: shards absent from `other` pass through
    /// unchanged; shards whose set becomes empty are dropped.
    pub fn remove_ranges(&self, other: &ShardTimeRanges) -> ShardTimeRanges {
        let mut out = BTreeMap::new();
        for (shard, ranges) in &self.shards {
            let remaining = match other.get(*shard) {
                Some(removed) => ranges.remove_ranges(removed),
                None => ranges.clone(),
            };
            if !remaining.is_empty() {
                out.insert(*shard, remaining);
            }
        }
        ShardTimeRanges { shards: out }
    }

    /// True iff every shard's range set is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.values().all(RangeSet::is_empty)
    }

    /// Iterates the shards that have at least one range.
    pub fn shards(&self) -> impl Iterator<Item = ShardIndex> + '_ {
        self.iter().map(|(shard, _)| shard)
    }

    /// Iterates `(shard, ranges)` pairs with non-empty range sets.
    pub fn iter(&self) -> impl Iterator<Item = (ShardIndex, &RangeSet)> {
        self.shards
            .iter()
            .filter(|(_, ranges)| !ranges.is_empty())
            .map(|(shard, ranges)| (*shard, ranges))
    }

    /// Total number of disjoint ranges across all shards.
    pub fn range_count(&self) -> usize {
        self.shards.values().map(RangeSet::len).sum()
    }
}

impl fmt::Display for ShardTimeRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (shard, ranges)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{shard}: {ranges}")?;
        }
        write!(f, "}}")
    }
}
