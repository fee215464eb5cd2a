// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! The filesystem bootstrap source.
//!
//! Supplies data already persisted to local disk. Availability is a cheap
//! structural inspection of each block's fileset; the read opens and fully
//! validates each fileset, and a fileset that fails validation only at read
//! time surfaces as an unfulfilled range for that block, never as an error
//! for sibling shards or ranges.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_core::{
    metadata::NamespaceMetadata,
    ranges::{ShardTimeRanges, TimeRange},
    ShardIndex, UnixMillis,
};

use super::{
    bootstrapper::Source,
    result::{BootstrapResult, ShardResult},
    RunOptions, Strategy,
};
use crate::{
    block::{DataBlock, Segment, SeriesId},
    config::BootstrapConfig,
    errors::{BootstrapError, FilesetError},
    fileset::FilesetStore,
    metrics::BootstrapMetricSet,
};

/// Bootstrap source over the local fileset store.
#[derive(Debug)]
pub struct FilesystemSource {
    store: Arc<dyn FilesetStore>,
    namespace: NamespaceMetadata,
    parallel_reads: bool,
    metrics: BootstrapMetricSet,
}

impl FilesystemSource {
    /// Creates a filesystem source for `namespace` over `store`.
    pub fn new(
        store: Arc<dyn FilesetStore>,
        namespace: NamespaceMetadata,
        config: &BootstrapConfig,
        metrics: BootstrapMetricSet,
    ) -> Self {
        Self {
            store,
            namespace,
            parallel_reads: config.fs_parallel_reads,
            metrics,
        }
    }

    /// Reads one fileset to completion, including digest validation.
    fn read_fileset(
        &self,
        shard: ShardIndex,
        block_start: UnixMillis,
    ) -> Result<Vec<(SeriesId, Segment)>, FilesetError> {
        let mut reader = self.store.open(&self.namespace.id, shard, block_start)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.read_entry()? {
            entries.push(entry);
        }
        reader.validate()?;
        reader.close()?;
        Ok(entries)
    }
}

#[async_trait]
impl Source for FilesystemSource {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn can(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::Sequential => true,
            Strategy::Parallel => self.parallel_reads,
        }
    }

    async fn available(&self, requested: &ShardTimeRanges) -> ShardTimeRanges {
        let block_size = self.namespace.retention.block_size;
        let mut available = ShardTimeRanges::new();
        for (shard, ranges) in requested.iter() {
            for range in ranges.iter() {
                for block_start in range.block_starts(block_size) {
                    if !self
                        .store
                        .fileset_complete(&self.namespace.id, shard, block_start)
                    {
                        continue;
                    }
                    let block_range = TimeRange::new(block_start, block_start + block_size);
                    // Clamp to the request so availability never exceeds it.
                    if let Some(covered) = block_range.intersect(range) {
                        available.add_shard_range(shard, covered);
                    }
                }
            }
        }
        available
    }

    async fn read(
        &self,
        available: ShardTimeRanges,
        _opts: &RunOptions,
    ) -> Result<BootstrapResult, BootstrapError> {
        let block_size = self.namespace.retention.block_size;
        let mut result = BootstrapResult::new();
        for (shard, ranges) in available.iter() {
            let mut shard_result = ShardResult::new();
            for range in ranges.iter() {
                for block_start in range.block_starts(block_size) {
                    match self.read_fileset(shard, block_start) {
                        Ok(entries) => {
                            for (series, segment) in entries {
                                shard_result.add_series_block(
                                    series,
                                    block_start,
                                    DataBlock::InMemory(segment),
                                );
                            }
                        }
                        Err(error) if error.is_fatal() => return Err(error.into()),
                        Err(error) => {
                            // One corrupt fileset must not fail sibling
                            // shards or ranges.
                            tracing::warn!(
                                meridian.namespace = %self.namespace.id,
                                meridian.shard = %shard,
                                meridian.block_start = %block_start,
                                ?error,
                                "fileset failed at read time; marking block unfulfilled"
                            );
                            self.metrics.fileset_validation_errors_total.inc();
                            let block_range =
                                TimeRange::new(block_start, block_start + block_size);
                            if let Some(missed) = block_range.intersect(range) {
                                result.unfulfilled_mut().add_shard_range(shard, missed);
                            }
                        }
                    }
                }
            }
            if !shard_result.is_empty() {
                result.add_shard_result(shard, shard_result);
            }
        }
        Ok(result)
    }
}
