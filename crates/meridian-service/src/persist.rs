// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Narrow contract over the persistence manager.
//!
//! One prepare/close pair covers one `(shard, block start)` interval; all
//! series segments for that interval are written through the same prepared
//! persist. The manager owns durability (fsync, checkpointing, rename-into-
//! place); the bootstrap core only sequences the calls.

use meridian_core::{metadata::NamespaceId, ShardIndex, UnixMillis};

use crate::{
    block::{Segment, SeriesId},
    errors::PersistError,
};

/// An open persistence transaction for one shard and block start.
pub trait PreparedPersist: Send {
    /// Writes one series' segment through the transaction.
    fn persist(&mut self, series: &SeriesId, segment: &Segment) -> Result<(), PersistError>;

    /// Commits the transaction, making all written segments durable.
    fn close(&mut self) -> Result<(), PersistError>;
}

/// Hands out persistence transactions.
pub trait PersistManager: std::fmt::Debug + Send + Sync {
    /// Opens a transaction for `(namespace, shard, block_start)`.
    fn prepare(
        &self,
        namespace: &NamespaceId,
        shard: ShardIndex,
        block_start: UnixMillis,
    ) -> Result<Box<dyn PreparedPersist>, PersistError>;
}
