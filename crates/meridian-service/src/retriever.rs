// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Narrow contract over the block-retriever manager.
//!
//! Retrievers make flushed blocks servable without holding them in memory.
//! The bootstrap core uses the manager in exactly two ways: to obtain the
//! retriever handle embedded in retrievable stubs, and to pre-cache shard
//! index structures once an incremental bootstrap completes.

use meridian_core::{metadata::NamespaceMetadata, ShardIndex};

use crate::{block::BlockRetriever, errors::RetrieveError};

/// A retriever for one namespace's persisted blocks.
pub trait DatabaseBlockRetriever: BlockRetriever {
    /// Warms the per-shard index caches so the first post-bootstrap read of a
    /// retrievable block does not pay a cold-cache penalty.
    fn cache_shard_indices(&self, shards: &[ShardIndex]) -> Result<(), RetrieveError>;
}

/// Hands out per-namespace block retrievers.
pub trait BlockRetrieverManager: std::fmt::Debug + Send + Sync {
    /// Returns the retriever for `namespace`.
    fn retriever(
        &self,
        namespace: &NamespaceMetadata,
    ) -> Result<std::sync::Arc<dyn DatabaseBlockRetriever>, RetrieveError>;
}
