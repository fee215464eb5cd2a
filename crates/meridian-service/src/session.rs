// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Narrow contract over the admin RPC session used for peer fetches.
//!
//! The session's peer selection, retries, and consistency-level semantics are
//! its own concern; a fetch either yields the shard's data for the range or a
//! [`SessionError`] that the peer source accounts as unfulfilled.

use async_trait::async_trait;
use meridian_core::{metadata::NamespaceId, ranges::TimeRange, ShardIndex};

use crate::{bootstrap::result::ShardResult, errors::SessionError};

/// An admin session to the cluster's replica peers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminSession: std::fmt::Debug + Send + Sync {
    /// Fetches all bootstrap blocks for `shard` over `range` from whichever
    /// peer replica can serve them.
    async fn fetch_bootstrap_blocks(
        &self,
        namespace: &NamespaceId,
        shard: ShardIndex,
        range: TimeRange,
    ) -> Result<ShardResult, SessionError>;
}
