// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap orchestration for a Meridian storage node.
//!
//! On startup (and on topology change) a node reconstructs, for every shard it
//! owns and for a set of required time ranges, the series data that existed
//! before it came up. This crate contains the orchestration core: the
//! chain-of-responsibility over bootstrap [sources](bootstrap::Source), the
//! waterfall reconciliation between them, and the peer source's incremental
//! memory-bounded flush pipeline.
//!
//! The on-disk fileset format, the commit log, the series codec, the peer wire
//! protocol, and the block-retriever machinery are external collaborators,
//! consumed through the narrow contracts in [`fileset`], [`persist`],
//! [`session`], and [`retriever`].

pub mod block;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod fileset;
pub mod metrics;
pub mod persist;
pub mod retriever;
pub mod session;
