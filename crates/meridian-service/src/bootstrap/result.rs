// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap result aggregation.

use std::collections::{BTreeMap, HashMap};

use meridian_core::{ranges::ShardTimeRanges, ShardIndex, UnixMillis};

use crate::block::{DataBlock, SeriesBlocks, SeriesId};

/// All series data fetched for one shard. Opaque to the orchestration core.
#[derive(Debug, Clone, Default)]
pub struct ShardResult {
    series: HashMap<SeriesId, SeriesBlocks>,
}

impl ShardResult {
    /// Creates an empty shard result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `block` for `series` at `block_start`.
    pub fn add_series_block(&mut self, series: SeriesId, block_start: UnixMillis, block: DataBlock) {
        self.series
            .entry(series)
            .or_default()
            .insert(block_start, block);
    }

    /// Merges another shard result into this one; `other` wins on conflicting
    /// blocks.
    pub fn merge(&mut self, other: ShardResult) {
        for (series, blocks) in other.series {
            self.series.entry(series).or_default().merge(blocks);
        }
    }

    /// The fetched series, keyed by identifier.
    pub fn series(&self) -> &HashMap<SeriesId, SeriesBlocks> {
        &self.series
    }

    /// Mutable access to the fetched series.
    pub fn series_mut(&mut self) -> &mut HashMap<SeriesId, SeriesBlocks> {
        &mut self.series
    }

    /// The number of fetched series.
    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    /// True iff no series were fetched.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// The aggregate outcome of one bootstrap invocation.
///
/// Invariant: `unfulfilled` is a conservative superset of the ranges truly not
/// fetched. Retrying a range that was actually fetched is safe; omitting a
/// genuinely missing range is not.
#[derive(Debug, Clone, Default)]
pub struct BootstrapResult {
    shard_results: BTreeMap<ShardIndex, ShardResult>,
    unfulfilled: ShardTimeRanges,
}

impl BootstrapResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `result` into the data for `shard`.
    pub fn add_shard_result(&mut self, shard: ShardIndex, result: ShardResult) {
        self.shard_results.entry(shard).or_default().merge(result);
    }

    /// Merges a map of per-shard results into this one.
    pub fn add_shard_results(&mut self, results: BTreeMap<ShardIndex, ShardResult>) {
        for (shard, result) in results {
            self.add_shard_result(shard, result);
        }
    }

    /// The per-shard fetched data.
    pub fn shard_results(&self) -> &BTreeMap<ShardIndex, ShardResult> {
        &self.shard_results
    }

    /// The shards for which any data was fetched.
    pub fn shards(&self) -> impl Iterator<Item = ShardIndex> + '_ {
        self.shard_results.keys().copied()
    }

    /// The ranges that remain unfulfilled.
    pub fn unfulfilled(&self) -> &ShardTimeRanges {
        &self.unfulfilled
    }

    /// Mutable access to the unfulfilled ranges.
    pub fn unfulfilled_mut(&mut self) -> &mut ShardTimeRanges {
        &mut self.unfulfilled
    }

    /// Replaces the unfulfilled ranges.
    pub fn set_unfulfilled(&mut self, unfulfilled: ShardTimeRanges) {
        self.unfulfilled = unfulfilled;
    }

    /// Takes the unfulfilled ranges, leaving an empty set behind.
    pub fn take_unfulfilled(&mut self) -> ShardTimeRanges {
        std::mem::take(&mut self.unfulfilled)
    }

    /// Splits the result into its per-shard data and its unfulfilled ranges.
    pub fn into_parts(self) -> (BTreeMap<ShardIndex, ShardResult>, ShardTimeRanges) {
        (self.shard_results, self.unfulfilled)
    }
}

/// Coverage accounting for the reverse index.
///
/// Index segments are built by the index subsystem, not by the bootstrap
/// sources; this result only records which requested index ranges no source
/// has claimed.
#[derive(Debug, Clone, Default)]
pub struct IndexBootstrapResult {
    /// The index ranges no source fulfilled.
    pub unfulfilled: ShardTimeRanges,
}

/// The outcome of a full [`Process::run`](super::Process::run).
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// Fetched series data and data-range accounting.
    pub data: BootstrapResult,
    /// Index-range accounting.
    pub index: IndexBootstrapResult,
}
