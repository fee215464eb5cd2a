// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap configuration.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Configuration of the bootstrap pipeline.
///
/// Treated as frozen once the bootstrap process is constructed; attempts never
/// mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Concurrency of the peer-fetch worker pool.
    #[serde(default = "defaults::fetch_concurrency")]
    pub fetch_concurrency: NonZeroUsize,
    /// Concurrency of the peer-fetch worker pool when flushing incrementally.
    /// Smaller than `fetch_concurrency`, since persistence adds backpressure.
    #[serde(default = "defaults::incremental_fetch_concurrency")]
    pub incremental_fetch_concurrency: NonZeroUsize,
    /// Capacity of the queue between the fetch workers and the single flush
    /// consumer. The bound is the memory backpressure: when persistence falls
    /// behind, fetch workers block on enqueue.
    #[serde(default = "defaults::flush_queue_depth")]
    pub flush_queue_depth: NonZeroUsize,
    /// Whether local fileset reads may run concurrently with another source.
    #[serde(default = "defaults::fs_parallel_reads")]
    pub fs_parallel_reads: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: defaults::fetch_concurrency(),
            incremental_fetch_concurrency: defaults::incremental_fetch_concurrency(),
            flush_queue_depth: defaults::flush_queue_depth(),
            fs_parallel_reads: defaults::fs_parallel_reads(),
        }
    }
}

mod defaults {
    use std::num::NonZeroUsize;

    pub fn fetch_concurrency() -> NonZeroUsize {
        NonZeroUsize::new(16).expect("default is non-zero")
    }

    pub fn incremental_fetch_concurrency() -> NonZeroUsize {
        NonZeroUsize::new(4).expect("default is non-zero")
    }

    pub fn flush_queue_depth() -> NonZeroUsize {
        NonZeroUsize::new(8).expect("default is non-zero")
    }

    pub fn fs_parallel_reads() -> bool {
        true
    }
}
