// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! The bootstrap orchestration pipeline.
//!
//! A bootstrap attempt is driven by a [`Process`] over a chain of
//! [`Bootstrapper`]s, each wrapping one [`Source`] and falling back to the
//! next link for whatever its source cannot supply. The chain reconciles
//! partial success between sources via the waterfall algorithm in
//! [`bootstrapper`], with the guarantee that a range is only ever reported
//! fulfilled if some source actually returned it.

use meridian_core::ranges::TimeRange;
use serde::{Deserialize, Serialize};

pub mod bootstrapper;
pub mod fs;
pub mod peers;
pub mod process;
pub mod result;

pub use bootstrapper::{Bootstrapper, NoOpBootstrapper, Source, SourceBootstrapper};
pub use fs::FilesystemSource;
pub use peers::PeersSource;
pub use process::Process;
pub use result::{BootstrapResult, IndexBootstrapResult, ProcessResult, ShardResult};

/// Whether a chain node may run concurrently with its neighbor.
///
/// This is a static capability of a source, not a runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// The node must run alone.
    Sequential,
    /// The node may overlap with its neighbor's I/O.
    Parallel,
}

/// Per-attempt options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Whether the peer source must flush fetched blocks to durable storage
    /// as it goes rather than holding them all in memory.
    pub incremental: bool,
}

/// A time range to bootstrap together with the options for the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRange {
    /// The range to bootstrap.
    pub range: TimeRange,
    /// Options for the attempt over this range.
    pub run_options: RunOptions,
}
