// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! The top-level bootstrap process.
//!
//! Computes the required shard time ranges from the namespace's retention
//! configuration and drives the bootstrapper chain over them, one attempt per
//! target range. The caller receives either a hard error (the node must not
//! mark itself bootstrapped) or a result whose unfulfilled set accounts
//! exactly for what no source could supply; whether to accept a degraded
//! bootstrap is the storage engine's policy, not this module's.

use std::sync::Arc;

use meridian_core::{
    metadata::{NamespaceMetadata, RetentionOptions},
    ranges::{ShardTimeRanges, TimeRange},
    ShardIndex, UnixMillis,
};

use super::{
    bootstrapper::Bootstrapper,
    result::{BootstrapResult, IndexBootstrapResult, ProcessResult},
    RunOptions, TargetRange,
};
use crate::{errors::BootstrapError, metrics::BootstrapMetricSet};

/// Drives the bootstrapper chain for a namespace.
#[derive(Debug, Clone)]
pub struct Process {
    root: Arc<dyn Bootstrapper>,
    metrics: BootstrapMetricSet,
}

impl Process {
    /// Creates a process over the chain rooted at `root`.
    pub fn new(root: Arc<dyn Bootstrapper>, metrics: BootstrapMetricSet) -> Self {
        Self { root, metrics }
    }

    /// The target ranges a node needs after coming up at `now`: the sealed
    /// retention window, flushed incrementally, and the active buffer window
    /// around `now`, kept in memory for the mutable series buffers.
    pub fn base_target_ranges(now: UnixMillis, retention: &RetentionOptions) -> Vec<TargetRange> {
        vec![
            TargetRange {
                range: TimeRange::new(
                    now - retention.retention_period,
                    now - retention.buffer_past,
                ),
                run_options: RunOptions { incremental: true },
            },
            TargetRange {
                range: TimeRange::new(
                    now - retention.buffer_past,
                    now + retention.buffer_future,
                ),
                run_options: RunOptions { incremental: false },
            },
        ]
    }

    /// Bootstraps `shards` of `namespace` over `target_ranges`.
    pub async fn run(
        &self,
        namespace: &NamespaceMetadata,
        shards: &[ShardIndex],
        target_ranges: Vec<TargetRange>,
    ) -> Result<ProcessResult, BootstrapError> {
        let mut data = BootstrapResult::new();
        let mut requested_total = ShardTimeRanges::new();

        for target in target_ranges {
            let requested =
                ShardTimeRanges::from_shards_and_range(shards.iter().copied(), target.range);
            requested_total.add_ranges(&requested);
            self.metrics
                .ranges_requested_total
                .inc_by(requested.range_count() as u64);

            tracing::info!(
                meridian.namespace = %namespace.id,
                range = %target.range,
                shards = shards.len(),
                incremental = target.run_options.incremental,
                "bootstrapping target range"
            );
            let started = std::time::Instant::now();
            let attempt = self.root.bootstrap(requested, &target.run_options).await?;
            self.metrics
                .bootstrap_duration_seconds
                .observe(started.elapsed().as_secs_f64());

            let (shard_results, unfulfilled) = attempt.into_parts();
            if unfulfilled.is_empty() {
                tracing::info!(
                    meridian.namespace = %namespace.id,
                    range = %target.range,
                    "target range fully bootstrapped"
                );
            } else {
                self.metrics
                    .ranges_unfulfilled_total
                    .inc_by(unfulfilled.range_count() as u64);
                tracing::warn!(
                    meridian.namespace = %namespace.id,
                    range = %target.range,
                    unfulfilled = %unfulfilled,
                    "bootstrap attempt finished with unfulfilled ranges"
                );
            }
            data.add_shard_results(shard_results);
            data.unfulfilled_mut().add_ranges(&unfulfilled);
        }

        // The chain's sources fetch series data only; index segments are
        // built by the index subsystem after bootstrap. An index-enabled
        // namespace therefore reports its full request as unfulfilled index
        // coverage rather than claiming anything it did not build.
        let index = if namespace.index_enabled {
            IndexBootstrapResult {
                unfulfilled: requested_total,
            }
        } else {
            IndexBootstrapResult::default()
        };

        Ok(ProcessResult { data, index })
    }
}
